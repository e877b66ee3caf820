//! Dependency graph checks over `depends_on` edges.

use std::collections::{BTreeMap, HashMap};

use crate::core::ball::Ball;
use crate::error::JuggleError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Fail with [`JuggleError::Cycle`] if the `depends_on` edges form a cycle.
///
/// Edges pointing at ids outside `balls` are ignored. Traversal order is
/// sorted by id so the reported cycle path is stable.
pub fn detect_circular_dependencies(balls: &[Ball]) -> Result<(), JuggleError> {
    let graph: BTreeMap<&str, Vec<&str>> = balls
        .iter()
        .map(|ball| {
            let mut deps: Vec<&str> = ball.depends_on.iter().map(String::as_str).collect();
            deps.sort_unstable();
            deps.dedup();
            (ball.id.as_str(), deps)
        })
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();
    for id in graph.keys() {
        if !marks.contains_key(id) {
            visit(id, &graph, &mut marks, &mut stack)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    id: &'a str,
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Result<(), JuggleError> {
    marks.insert(id, Mark::Visiting);
    stack.push(id);

    for dep in graph.get(id).into_iter().flatten() {
        if !graph.contains_key(dep) {
            continue;
        }
        match marks.get(dep).copied() {
            Some(Mark::Visited) => {}
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|s| s == dep).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                path.push(dep.to_string());
                return Err(JuggleError::Cycle { path });
            }
            None => visit(*dep, graph, marks, stack)?,
        }
    }

    stack.pop();
    marks.insert(id, Mark::Visited);
    Ok(())
}

/// Ids in `ball.depends_on` that are not yet done (complete or researched).
///
/// Unknown ids count as unmet.
pub fn unmet_dependencies(ball: &Ball, all: &[Ball]) -> Vec<String> {
    ball.depends_on
        .iter()
        .filter(|dep| {
            !all.iter()
                .any(|other| &other.id == *dep && other.state.is_done())
        })
        .cloned()
        .collect()
}

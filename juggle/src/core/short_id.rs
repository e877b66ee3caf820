//! Minimal unique id prefixes and prefix resolution.
//!
//! Short ids are relative to a display grouping: the same ball can have a
//! shorter short id when listed alone than when listed next to siblings.

use std::collections::BTreeMap;

use crate::core::ball::Ball;
use crate::error::JuggleError;

/// Map every id to its shortest prefix not shared by any other id in `ids`.
///
/// An id that is itself a prefix of another id maps to itself. Duplicate ids
/// are collapsed before comparison, so the result is the same for any input
/// order.
pub fn compute_minimal_unique_ids<S: AsRef<str>>(ids: &[S]) -> BTreeMap<String, String> {
    let mut sorted: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut short = BTreeMap::new();
    for (i, id) in sorted.iter().enumerate() {
        // In sorted order the longest shared prefix is always with a neighbor.
        let mut needed = 0;
        if i > 0 {
            needed = needed.max(common_prefix_chars(id, sorted[i - 1]));
        }
        if let Some(next) = sorted.get(i + 1) {
            needed = needed.max(common_prefix_chars(id, next));
        }
        short.insert((*id).to_string(), take_chars(id, needed + 1).to_string());
    }
    short
}

/// Resolve `query` to exactly one ball.
///
/// A query matches a ball when it is a prefix of the full id, ignoring ASCII
/// case. Short ids from [`compute_minimal_unique_ids`] are such prefixes, so
/// each one resolves back to its own ball within the set it was computed for.
/// An exact full-id match wins over prefix matches.
pub fn resolve_by_prefix<'a>(balls: &'a [Ball], query: &str) -> Result<&'a Ball, JuggleError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(JuggleError::ball_not_found(query));
    }
    if let Some(exact) = balls.iter().find(|ball| ball.id == query) {
        return Ok(exact);
    }

    let mut matches: Vec<&Ball> = balls
        .iter()
        .filter(|ball| matches_prefix(&ball.id, query))
        .collect();
    matches.sort_by(|a, b| a.id.cmp(&b.id));
    matches.dedup_by(|a, b| a.id == b.id);

    match matches.as_slice() {
        [] => Err(JuggleError::ball_not_found(query)),
        [only] => Ok(*only),
        many => Err(JuggleError::Ambiguous {
            query: query.to_string(),
            candidates: many.iter().map(|ball| ball.id.clone()).collect(),
        }),
    }
}

fn matches_prefix(id: &str, query: &str) -> bool {
    id.get(..query.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(query))
}

fn common_prefix_chars(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

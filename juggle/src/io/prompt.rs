//! Prompt generation for agent iterations.
//!
//! Rendering is deterministic for a fixed store, session and progress log.

use std::cmp::Reverse;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::ball::{Ball, BallState};
use crate::core::deps::unmet_dependencies;
use crate::io::progress_log::FileProgressLog;
use crate::io::session::SessionStore;
use crate::io::store::BallStore;

const AGENT_TEMPLATE: &str = include_str!("prompts/agent.md");

pub trait PromptGenerator {
    /// Render the prompt for the next iteration of `session_id`, optionally
    /// narrowed to one ball.
    fn generate(&self, session_id: &str, ball_filter: Option<&str>) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
struct BallContext {
    id: String,
    title: String,
    state: &'static str,
    priority: &'static str,
    working_dir: String,
    model_size: Option<&'static str>,
    blocked_reason: Option<String>,
    depends_on: Vec<String>,
    unmet: Vec<String>,
    acceptance_criteria: Vec<String>,
}

impl BallContext {
    fn from_ball(ball: &Ball, all: &[Ball]) -> Self {
        Self {
            id: ball.id.clone(),
            title: ball.title.clone(),
            state: ball.state.as_str(),
            priority: ball.priority.as_str(),
            working_dir: ball.working_dir.display().to_string(),
            model_size: ball.model_size.map(|m| m.as_str()),
            blocked_reason: ball.blocked_reason.clone(),
            depends_on: ball.depends_on.clone(),
            unmet: unmet_dependencies(ball, all),
            acceptance_criteria: ball.acceptance_criteria.clone(),
        }
    }
}

/// In-progress balls first, then by descending priority, then by id.
pub fn prompt_order(balls: &mut [Ball]) {
    balls.sort_by_key(|ball| {
        (
            ball.state != BallState::InProgress,
            Reverse(ball.priority),
            ball.id.clone(),
        )
    });
}

/// Renders `prompts/agent.md` from the on-disk project state.
pub struct TemplatePromptGenerator {
    balls: BallStore,
    sessions: SessionStore,
    progress: FileProgressLog,
    tail_lines: usize,
    env: Environment<'static>,
}

impl TemplatePromptGenerator {
    pub fn new(root: &Path, tail_lines: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("agent", AGENT_TEMPLATE)
            .context("load agent prompt template")?;
        Ok(Self {
            balls: BallStore::open(root)?,
            sessions: SessionStore::open(root),
            progress: FileProgressLog::new(root),
            tail_lines,
            env,
        })
    }
}

impl PromptGenerator for TemplatePromptGenerator {
    fn generate(&self, session_id: &str, ball_filter: Option<&str>) -> Result<String> {
        let session = self.sessions.load(session_id)?;
        let all = self.balls.load_all()?;
        let mut targets = self.balls.target_balls(session_id, ball_filter)?;
        prompt_order(&mut targets);

        let balls: Vec<BallContext> = targets
            .iter()
            .map(|ball| BallContext::from_ball(ball, &all))
            .collect();
        let progress = self.progress.tail(session_id, self.tail_lines)?;
        let progress_path = self.balls.paths().session(session_id).progress_path;

        let template = self.env.get_template("agent")?;
        let rendered = template
            .render(context! {
                session => context! {
                    id => session.id.as_str(),
                    description => session.description.trim(),
                    context => session.context.trim(),
                },
                balls => balls,
                progress => progress,
                progress_path => progress_path.display().to_string(),
            })
            .with_context(|| format!("render prompt for session {session_id}"))?;
        debug!(session = session_id, bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}

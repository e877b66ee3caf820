//! Typed failures that callers match on.
//!
//! Side-effecting helpers return `anyhow::Result`; when a failure belongs to
//! this taxonomy it is raised as a [`JuggleError`] inside the `anyhow::Error`
//! so callers can recover it with `downcast_ref::<JuggleError>()`.

use std::time::Duration;

use thiserror::Error;

use crate::core::ball::BallState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JuggleError {
    #[error("{kind} not found: {query}")]
    NotFound { kind: &'static str, query: String },

    #[error("ambiguous id '{query}' matches {}: {}", candidates.len(), candidates.join(", "))]
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },

    #[error("invalid state transition for {id}: {from} -> {to} ({detail})")]
    InvalidStateTransition {
        id: String,
        from: BallState,
        to: BallState,
        detail: String,
    },

    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("session '{session}' is already locked by {holder}")]
    AlreadyLocked { session: String, holder: String },

    #[error("agent runner failed: {0}")]
    RunnerFailure(String),

    #[error("iteration {iterations} timed out: {message}")]
    TimedOut { iterations: u32, message: String },

    #[error(
        "rate limit wait budget exceeded after {iterations} iterations ({}s waited)",
        waited.as_secs()
    )]
    RateLimitBudgetExceeded { iterations: u32, waited: Duration },

    #[error("ball {0} is not archived")]
    NotArchived(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl JuggleError {
    pub fn ball_not_found(query: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "ball",
            query: query.into(),
        }
    }

    pub fn session_not_found(query: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "session",
            query: query.into(),
        }
    }
}

/// Find a [`JuggleError`] anywhere in an `anyhow` chain.
pub fn find_juggle_error(err: &anyhow::Error) -> Option<&JuggleError> {
    err.chain().find_map(|cause| cause.downcast_ref::<JuggleError>())
}

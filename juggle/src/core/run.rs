//! Outcome of one orchestrator run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::aggregate::AggregateCounts;
use crate::error::JuggleError;

/// Why a run stopped. Every variant is a reportable outcome; only
/// `TimedOut` and `RateLimitBudgetExceeded` are failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStop {
    Complete,
    Blocked { reason: String },
    TimedOut { message: String },
    RateLimitBudgetExceeded,
    MaxIterationsReached,
}

impl RunStop {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStop::Complete => "complete",
            RunStop::Blocked { .. } => "blocked",
            RunStop::TimedOut { .. } => "timed_out",
            RunStop::RateLimitBudgetExceeded => "rate_limit_budget_exceeded",
            RunStop::MaxIterationsReached => "max_iterations_reached",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ball_filter: Option<String>,
    /// Iterations that ran to a result. Rate-limited retries are not counted.
    pub iterations: u32,
    pub stop: RunStop,
    /// Aggregate over the targeted balls when the run stopped.
    pub counts: AggregateCounts,
    /// Cumulative rate-limit waiting.
    #[serde(with = "duration_secs")]
    pub total_wait: Duration,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl RunResult {
    pub fn complete(&self) -> bool {
        self.stop == RunStop::Complete
    }

    pub fn blocked(&self) -> bool {
        matches!(self.stop, RunStop::Blocked { .. })
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.stop, RunStop::TimedOut { .. })
    }

    pub fn rate_limit_exceeded(&self) -> bool {
        self.stop == RunStop::RateLimitBudgetExceeded
    }

    pub fn max_iterations_reached(&self) -> bool {
        self.stop == RunStop::MaxIterationsReached
    }

    /// The taxonomy error for failing stops, carrying the iteration count and
    /// cumulative wait so the caller can retry deliberately.
    pub fn as_error(&self) -> Option<JuggleError> {
        match &self.stop {
            RunStop::TimedOut { message } => Some(JuggleError::TimedOut {
                iterations: self.iterations,
                message: message.clone(),
            }),
            RunStop::RateLimitBudgetExceeded => Some(JuggleError::RateLimitBudgetExceeded {
                iterations: self.iterations,
                waited: self.total_wait,
            }),
            _ => None,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

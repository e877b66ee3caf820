//! Shared contract types between the orchestrator and agent runners.
//!
//! These types carry no behavior beyond classification and must stay
//! deterministic so tests can script runner results.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JuggleError;

/// How the agent process is attached to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Prompt on stdin, output captured.
    #[default]
    Headless,
    /// Inherits the terminal; output is not captured.
    Interactive,
}

/// Trust level granted to the agent for tool use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// Read-only planning.
    Restricted,
    /// Edits allowed, other tools gated.
    #[default]
    Standard,
    /// Every tool allowed without prompting.
    Full,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionLevel::Restricted => "restricted",
            PermissionLevel::Standard => "standard",
            PermissionLevel::Full => "full",
        })
    }
}

impl FromStr for PermissionLevel {
    type Err = JuggleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restricted" => Ok(PermissionLevel::Restricted),
            "standard" => Ok(PermissionLevel::Standard),
            "full" => Ok(PermissionLevel::Full),
            other => Err(JuggleError::Validation(format!(
                "unknown permission level '{other}'"
            ))),
        }
    }
}

/// Output of one agent invocation plus the signals parsed from it.
///
/// Signals are self-reported by the agent and are not trusted on their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentResult {
    pub output: String,
    pub rate_limited: bool,
    pub retry_after: Option<Duration>,
    pub timed_out: bool,
    pub complete: bool,
    pub continue_: bool,
    pub blocked: bool,
    pub blocked_reason: String,
}

/// The single signal the orchestrator acts on for an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentSignal {
    Complete,
    Continue,
    Blocked(String),
}

impl AgentResult {
    /// Highest-priority reported signal: complete, then continue, then blocked.
    pub fn signal(&self) -> Option<AgentSignal> {
        if self.complete {
            Some(AgentSignal::Complete)
        } else if self.continue_ {
            Some(AgentSignal::Continue)
        } else if self.blocked {
            Some(AgentSignal::Blocked(self.blocked_reason.clone()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_outranks_other_signals() {
        let result = AgentResult {
            complete: true,
            continue_: true,
            blocked: true,
            ..AgentResult::default()
        };
        assert_eq!(result.signal(), Some(AgentSignal::Complete));
    }

    #[test]
    fn blocked_carries_reason() {
        let result = AgentResult {
            blocked: true,
            blocked_reason: "needs api key".to_string(),
            ..AgentResult::default()
        };
        assert_eq!(
            result.signal(),
            Some(AgentSignal::Blocked("needs api key".to_string()))
        );
    }

    #[test]
    fn no_signal_by_default() {
        assert_eq!(AgentResult::default().signal(), None);
    }
}

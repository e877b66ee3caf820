//! The ball: one unit of agent work and its lifecycle.
//!
//! Legal transitions:
//!
//! ```text
//! pending ──start──▶ in_progress ──complete──▶ complete
//!                     │   ▲      ──research──▶ researched
//!                 block   resume
//!                     ▼   │
//!                    blocked
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JuggleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallState {
    Pending,
    InProgress,
    Blocked,
    Complete,
    Researched,
}

impl BallState {
    pub fn as_str(self) -> &'static str {
        match self {
            BallState::Pending => "pending",
            BallState::InProgress => "in_progress",
            BallState::Blocked => "blocked",
            BallState::Complete => "complete",
            BallState::Researched => "researched",
        }
    }

    /// Counts toward run completion.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BallState::Complete | BallState::Researched | BallState::Blocked
        )
    }

    /// Finished for dependency purposes; blocked balls do not unblock dependents.
    pub fn is_done(self) -> bool {
        matches!(self, BallState::Complete | BallState::Researched)
    }
}

impl fmt::Display for BallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BallState {
    type Err = JuggleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BallState::Pending),
            "in_progress" | "in-progress" => Ok(BallState::InProgress),
            "blocked" => Ok(BallState::Blocked),
            "complete" => Ok(BallState::Complete),
            "researched" => Ok(BallState::Researched),
            other => Err(JuggleError::Validation(format!("unknown state '{other}'"))),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = JuggleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(JuggleError::Validation(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

/// Hint for which model tier the agent should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }
}

impl FromStr for ModelSize {
    type Err = JuggleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            other => Err(JuggleError::Validation(format!(
                "unknown model size '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ball {
    pub id: String,
    pub title: String,
    pub working_dir: PathBuf,
    pub priority: Priority,
    pub state: BallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_size: Option<ModelSize>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_count: u64,
}

/// A requested state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Start,
    Block(String),
    Resume,
    Complete,
    Research(String),
}

impl Transition {
    pub fn target(&self) -> BallState {
        match self {
            Transition::Start | Transition::Resume => BallState::InProgress,
            Transition::Block(_) => BallState::Blocked,
            Transition::Complete => BallState::Complete,
            Transition::Research(_) => BallState::Researched,
        }
    }
}

impl Ball {
    pub fn new(id: String, title: String, working_dir: PathBuf, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            working_dir,
            priority,
            state: BallState::Pending,
            blocked_reason: None,
            output: None,
            acceptance_criteria: Vec::new(),
            tags: BTreeSet::new(),
            depends_on: Vec::new(),
            model_size: None,
            created_at: now,
            started_at: None,
            last_activity: now,
            completed_at: None,
            update_count: 0,
        }
    }

    pub fn in_session(&self, session_id: &str) -> bool {
        self.tags.contains(session_id)
    }

    /// Apply `transition`, leaving the ball untouched on error.
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> Result<(), JuggleError> {
        let from = self.state;
        let to = transition.target();
        let invalid = |detail: &str| JuggleError::InvalidStateTransition {
            id: self.id.clone(),
            from,
            to,
            detail: detail.to_string(),
        };

        match (&transition, from) {
            (Transition::Start, BallState::Pending) => {
                self.started_at.get_or_insert(now);
            }
            (Transition::Block(reason), BallState::InProgress) => {
                if reason.trim().is_empty() {
                    return Err(invalid("blocking requires a reason"));
                }
                self.blocked_reason = Some(reason.trim().to_string());
            }
            (Transition::Block(_), _) => {
                return Err(invalid("only in_progress balls can be blocked"));
            }
            (Transition::Resume, BallState::Blocked) => {
                self.blocked_reason = None;
            }
            (Transition::Complete, BallState::InProgress) => {
                self.completed_at = Some(now);
            }
            (Transition::Research(output), BallState::InProgress) => {
                if output.trim().is_empty() {
                    return Err(invalid("research requires output"));
                }
                self.output = Some(output.trim().to_string());
                self.completed_at = Some(now);
            }
            (Transition::Start, _) => return Err(invalid("only pending balls can be started")),
            (Transition::Resume, _) => return Err(invalid("only blocked balls can be resumed")),
            (Transition::Complete | Transition::Research(_), _) => {
                return Err(invalid("only in_progress balls can finish"));
            }
        }

        self.state = to;
        self.last_activity = now;
        Ok(())
    }

    /// Return an archived ball to the active workflow.
    pub fn restore(&mut self, now: DateTime<Utc>) {
        self.state = BallState::Pending;
        self.blocked_reason = None;
        self.completed_at = None;
        self.last_activity = now;
    }
}

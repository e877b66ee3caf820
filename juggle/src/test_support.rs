//! Test-only helpers: ball fixtures, a temp project and scripted collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::ball::{Ball, BallState, Priority, Transition};
use crate::core::types::AgentResult;
use crate::io::agent::{AgentRequest, AgentRunner};
use crate::io::init::{InitOptions, JugglePaths, init_project};
use crate::io::lock::SessionLock;
use crate::io::progress_log::{FileProgressLog, ProgressSink};
use crate::io::prompt::PromptGenerator;
use crate::io::session::{Session, SessionStore};
use crate::io::store::BallStore;
use crate::orchestrator::Sleeper;

/// Create a deterministic pending ball with default fields.
pub fn ball(id: &str) -> Ball {
    Ball::new(
        id.to_string(),
        format!("{id} title"),
        PathBuf::from("."),
        Priority::Medium,
    )
}

/// Create a ball with explicit `depends_on` edges.
pub fn ball_with_deps(id: &str, deps: &[&str]) -> Ball {
    let mut ball = ball(id);
    ball.depends_on = deps.iter().map(|dep| (*dep).to_string()).collect();
    ball
}

/// Create a ball in `state` without going through transitions.
pub fn ball_in_state(id: &str, state: BallState) -> Ball {
    let mut ball = ball(id);
    ball.state = state;
    if state == BallState::Blocked {
        ball.blocked_reason = Some("fixture".to_string());
    }
    ball
}

/// An initialized `.juggle/` project in a temp directory.
pub struct TestProject {
    _temp: TempDir,
    root: PathBuf,
    store: BallStore,
    sessions: SessionStore,
    progress: FileProgressLog,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("juggle-test").tempdir()?;
        let root = temp.path().to_path_buf();
        init_project(&root, &InitOptions { force: false })?;
        Ok(Self {
            store: BallStore::open(&root)?,
            sessions: SessionStore::open(&root),
            progress: FileProgressLog::new(&root),
            root,
            _temp: temp,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self) -> JugglePaths {
        JugglePaths::new(&self.root)
    }

    pub fn store(&self) -> &BallStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn progress(&self) -> &FileProgressLog {
        &self.progress
    }

    pub fn create_session(&self, id: &str) -> Result<Session> {
        self.sessions.create(id, &format!("{id} session"))
    }
}

/// One scripted agent invocation: the result to return plus the side effects
/// a real agent would have had on the project.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub result: AgentResult,
    pub progress: Vec<String>,
    pub transitions: Vec<(String, Transition)>,
}

impl ScriptedTurn {
    /// No signal and no side effects.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn complete() -> Self {
        Self::with_result(AgentResult {
            output: "<promise>COMPLETE</promise>".to_string(),
            complete: true,
            ..AgentResult::default()
        })
    }

    pub fn continue_() -> Self {
        Self::with_result(AgentResult {
            output: "<promise>CONTINUE</promise>".to_string(),
            continue_: true,
            ..AgentResult::default()
        })
    }

    pub fn blocked(reason: &str) -> Self {
        Self::with_result(AgentResult {
            output: format!("<promise>BLOCKED: {reason}</promise>"),
            blocked: true,
            blocked_reason: reason.to_string(),
            ..AgentResult::default()
        })
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::with_result(AgentResult {
            output: "rate limit exceeded".to_string(),
            rate_limited: true,
            retry_after,
            ..AgentResult::default()
        })
    }

    pub fn timed_out() -> Self {
        Self::with_result(AgentResult {
            timed_out: true,
            ..AgentResult::default()
        })
    }

    pub fn with_result(result: AgentResult) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }

    /// Append `line` to the session progress log during the turn.
    pub fn with_progress(mut self, line: &str) -> Self {
        self.progress.push(line.to_string());
        self
    }

    /// Apply `transition` to ball `id` during the turn.
    pub fn with_transition(mut self, id: &str, transition: Transition) -> Self {
        self.transitions.push((id.to_string(), transition));
        self
    }
}

/// Agent runner that replays [`ScriptedTurn`]s in order.
///
/// Side effects go to the project at `root`. Progress lines are appended to
/// every session whose lock is currently held, which in tests is the one
/// being run.
pub struct ScriptedRunner {
    root: PathBuf,
    turns: RefCell<VecDeque<ScriptedTurn>>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedRunner {
    pub fn new(root: &Path, turns: Vec<ScriptedTurn>) -> Self {
        Self {
            root: root.to_path_buf(),
            turns: RefCell::new(turns.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }

    pub fn assert_drained(&self) {
        let remaining = self.turns.borrow().len();
        assert_eq!(remaining, 0, "scripted runner has {remaining} unused turns");
    }

    fn running_sessions(&self) -> Result<Vec<String>> {
        let paths = JugglePaths::new(&self.root);
        let sessions = SessionStore::open(&self.root).list()?;
        Ok(sessions
            .into_iter()
            .filter(|session| SessionLock::holder(&paths.session(&session.id).lock_path).is_some())
            .map(|session| session.id)
            .collect())
    }
}

impl AgentRunner for ScriptedRunner {
    fn run(&self, request: &AgentRequest) -> Result<AgentResult> {
        self.requests.borrow_mut().push(request.clone());
        let turn = self
            .turns
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted runner exhausted"))?;

        if !turn.progress.is_empty() {
            let log = FileProgressLog::new(&self.root);
            for session_id in self.running_sessions()? {
                for line in &turn.progress {
                    log.append(&session_id, line)?;
                }
            }
        }
        if !turn.transitions.is_empty() {
            let store = BallStore::open(&self.root)?;
            for (id, transition) in turn.transitions {
                store.transition(&id, transition)?;
            }
        }
        Ok(turn.result)
    }
}

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.slept.borrow().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// Prompt generator returning fixed text and counting calls.
pub struct StaticPrompts {
    text: String,
    calls: Cell<usize>,
}

impl StaticPrompts {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl PromptGenerator for StaticPrompts {
    fn generate(&self, _session_id: &str, _ball_filter: Option<&str>) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.text.clone())
    }
}

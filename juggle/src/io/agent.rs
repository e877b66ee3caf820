//! Agent runner abstraction.
//!
//! The [`AgentRunner`] trait decouples the orchestrator from the actual agent
//! backend (currently the `claude` CLI). Tests use scripted runners that
//! return predetermined results without spawning processes.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::ball::ModelSize;
use crate::core::signals::parse_agent_output;
use crate::core::types::{AgentMode, AgentResult, PermissionLevel};
use crate::error::JuggleError;
use crate::io::process::{Tee, run_command};

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    pub prompt: String,
    pub mode: AgentMode,
    pub permission: PermissionLevel,
    /// Kill the agent after this long. Unbounded when unset.
    pub timeout: Option<Duration>,
    pub model: Option<ModelSize>,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

pub trait AgentRunner {
    /// Run the agent once.
    ///
    /// Returns `Err` only when the agent could not be invoked at all. Timeouts,
    /// rate limits and non-zero exits are reported through [`AgentResult`].
    fn run(&self, request: &AgentRequest) -> Result<AgentResult>;
}

/// Runner that spawns the `claude` CLI (or a compatible command).
pub struct ClaudeRunner {
    /// Program followed by fixed leading arguments.
    command: Vec<String>,
    /// Echo headless stdout to stderr while the agent runs.
    echo: bool,
}

impl ClaudeRunner {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            echo: false,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn base_command(&self, request: &AgentRequest) -> Result<Command> {
        let (program, fixed) = self
            .command
            .split_first()
            .ok_or_else(|| JuggleError::RunnerFailure("agent command is empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(fixed)
            .args(permission_args(request.permission))
            .current_dir(&request.workdir);
        if let Some(model) = request.model {
            cmd.arg("--model").arg(model_alias(model));
        }
        Ok(cmd)
    }

    fn run_headless(&self, request: &AgentRequest) -> Result<AgentResult> {
        let mut cmd = self.base_command(request)?;
        cmd.arg("-p");

        let tee: Option<Tee> = self
            .echo
            .then(|| Box::new(std::io::stderr()) as Box<dyn Write + Send>);
        let output = run_command(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
            tee,
        )
        .map_err(|err| JuggleError::RunnerFailure(format!("{err:#}")))?;

        if !output.status.success() && !output.timed_out {
            warn!(exit_code = ?output.status.code(), "agent exited with failure");
        }
        let result = parse_agent_output(
            &output.combined_text(),
            output.status.success(),
            output.timed_out,
        );
        debug!(signal = ?result.signal(), rate_limited = result.rate_limited, "parsed agent output");
        Ok(result)
    }

    fn run_interactive(&self, request: &AgentRequest) -> Result<AgentResult> {
        let mut cmd = self.base_command(request)?;
        cmd.arg(&request.prompt)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|err| JuggleError::RunnerFailure(format!("spawn agent: {err}")))?;

        let (status, timed_out) = match request.timeout {
            None => (child.wait().context("wait for agent")?, false),
            Some(limit) => match child.wait_timeout(limit).context("wait for agent")? {
                Some(status) => (status, false),
                None => {
                    warn!(timeout_secs = limit.as_secs(), "interactive agent timed out, killing");
                    child.kill().context("kill agent")?;
                    (child.wait().context("wait agent after kill")?, true)
                }
            },
        };
        // Output went to the terminal; only the timeout is known.
        Ok(parse_agent_output("", status.success(), timed_out))
    }
}

impl AgentRunner for ClaudeRunner {
    #[instrument(skip_all, fields(mode = ?request.mode, permission = %request.permission))]
    fn run(&self, request: &AgentRequest) -> Result<AgentResult> {
        info!(workdir = %request.workdir.display(), "starting agent");
        match request.mode {
            AgentMode::Headless => self.run_headless(request),
            AgentMode::Interactive => self.run_interactive(request),
        }
    }
}

fn permission_args(permission: PermissionLevel) -> Vec<&'static str> {
    match permission {
        PermissionLevel::Restricted => vec!["--permission-mode", "plan"],
        PermissionLevel::Standard => vec!["--permission-mode", "acceptEdits"],
        PermissionLevel::Full => vec!["--dangerously-skip-permissions"],
    }
}

fn model_alias(model: ModelSize) -> &'static str {
    match model {
        ModelSize::Small => "haiku",
        ModelSize::Medium => "sonnet",
        ModelSize::Large => "opus",
    }
}

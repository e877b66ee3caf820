//! Project configuration stored under `.juggle/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Juggle configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values in `Default`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JuggleConfig {
    /// Iterations per `juggle run` unless overridden.
    pub max_iterations: u32,

    /// Pause between iterations in seconds. Skipped after the last iteration.
    pub iteration_delay_secs: u64,

    /// Per-iteration wall-clock limit for the agent process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_timeout_secs: Option<u64>,

    /// Total rate-limit waiting allowed per run. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rate_limit_wait_secs: Option<u64>,

    /// Truncate captured agent output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Interval between countdown updates while waiting out a rate limit.
    pub countdown_tick_secs: u64,

    /// Progress log lines included in each prompt.
    pub progress_tail_lines: usize,

    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Command prefix used to launch the agent (e.g. `["claude"]`).
    pub command: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
        }
    }
}

impl Default for JuggleConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            iteration_delay_secs: 0,
            iteration_timeout_secs: None,
            max_rate_limit_wait_secs: None,
            output_limit_bytes: 1_000_000,
            countdown_tick_secs: 15,
            progress_tail_lines: 40,
            agent: AgentConfig::default(),
        }
    }
}

impl JuggleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.iteration_timeout_secs == Some(0) {
            return Err(anyhow!("iteration_timeout_secs must be > 0 when set"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.countdown_tick_secs == 0 {
            return Err(anyhow!("countdown_tick_secs must be > 0"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `JuggleConfig::default()`.
pub fn load_config(path: &Path) -> Result<JuggleConfig> {
    if !path.exists() {
        let cfg = JuggleConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: JuggleConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &JuggleConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

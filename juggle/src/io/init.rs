//! Initialization helpers for `.juggle/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{JuggleConfig, write_config};

/// All canonical paths within `.juggle/` for a project root.
#[derive(Debug, Clone)]
pub struct JugglePaths {
    pub root: PathBuf,
    pub juggle_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub config_path: PathBuf,
    pub balls_path: PathBuf,
    pub archive_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl JugglePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let juggle_dir = root.join(".juggle");
        let archive_dir = juggle_dir.join("archive");
        let sessions_dir = juggle_dir.join("sessions");
        Self {
            root: root.clone(),
            juggle_dir: juggle_dir.clone(),
            archive_dir: archive_dir.clone(),
            sessions_dir: sessions_dir.clone(),
            config_path: juggle_dir.join("config.toml"),
            balls_path: juggle_dir.join("balls.jsonl"),
            archive_path: archive_dir.join("balls.jsonl"),
            gitignore_path: juggle_dir.join(".gitignore"),
        }
    }

    pub fn session(&self, session_id: &str) -> SessionPaths {
        SessionPaths::new(&self.sessions_dir, session_id)
    }

    /// Directory name of the project root, used as the ball id prefix.
    pub fn project_name(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "juggle".to_string())
    }
}

/// Per-session files under `.juggle/sessions/<id>/`.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub session_path: PathBuf,
    pub progress_path: PathBuf,
    pub last_output_path: PathBuf,
    pub last_run_path: PathBuf,
    pub lock_path: PathBuf,
}

impl SessionPaths {
    pub fn new(sessions_dir: &Path, session_id: &str) -> Self {
        let dir = sessions_dir.join(session_id);
        Self {
            dir: dir.clone(),
            session_path: dir.join("session.json"),
            progress_path: dir.join("progress.txt"),
            last_output_path: dir.join("last_output.txt"),
            last_run_path: dir.join("last_run.json"),
            lock_path: dir.join("agent.lock"),
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, rewrite the default config even if `.juggle/` exists.
    pub force: bool,
}

/// Create `.juggle/` scaffolding in `root`.
///
/// Fails if `.juggle/` already exists unless `options.force` is set. Ball and
/// session data are never touched by a forced re-init.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<JugglePaths> {
    let paths = JugglePaths::new(root);
    if paths.juggle_dir.exists() && !paths.juggle_dir.is_dir() {
        return Err(anyhow!("juggle init: .juggle exists but is not a directory"));
    }
    if paths.juggle_dir.exists() && !options.force {
        return Err(anyhow!(
            "juggle init: .juggle already exists (use --force to overwrite config)"
        ));
    }

    create_dir(&paths.juggle_dir)?;
    create_dir(&paths.archive_dir)?;
    create_dir(&paths.sessions_dir)?;

    write_config(&paths.config_path, &JuggleConfig::default())?;
    write_file(&paths.gitignore_path, JUGGLE_GITIGNORE)?;
    touch(&paths.balls_path)?;
    touch(&paths.archive_path)?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

fn touch(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    write_file(path, "")
}

const JUGGLE_GITIGNORE: &str = "sessions/*/last_output.txt\nsessions/*/agent.lock\n";

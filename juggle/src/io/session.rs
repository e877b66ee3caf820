//! Sessions: named groupings of balls with shared context.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::ball::ModelSize;
use crate::error::JuggleError;
use crate::io::init::JugglePaths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Free-form notes included in every agent prompt for this session.
    #[serde(default)]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<ModelSize>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            description: description.into(),
            context: String::new(),
            default_model: None,
            acceptance_criteria: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct SessionStore {
    paths: JugglePaths,
}

impl SessionStore {
    pub fn open(root: &Path) -> Self {
        Self {
            paths: JugglePaths::new(root),
        }
    }

    pub fn create(&self, id: &str, description: &str) -> Result<Session> {
        validate_session_id(id)?;
        let session_paths = self.paths.session(id);
        if session_paths.session_path.exists() {
            return Err(JuggleError::Validation(format!("session '{id}' already exists")).into());
        }
        fs::create_dir_all(&session_paths.dir)
            .with_context(|| format!("create directory {}", session_paths.dir.display()))?;
        let session = Session::new(id, description);
        self.write(&session)?;
        info!(id, "created session");
        Ok(session)
    }

    pub fn load(&self, id: &str) -> Result<Session> {
        let path = self.paths.session(id).session_path;
        if !path.is_file() {
            return Err(JuggleError::session_not_found(id).into());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }

    /// Persist `session`, refreshing `updated_at`.
    pub fn save(&self, session: &mut Session) -> Result<()> {
        session.updated_at = Utc::now();
        self.write(session)
    }

    /// Load, modify and save in one step.
    pub fn update<F>(&self, id: &str, modify: F) -> Result<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut session = self.load(id)?;
        modify(&mut session);
        self.save(&mut session)?;
        Ok(session)
    }

    /// All sessions sorted by id. Directories without a `session.json` are skipped.
    pub fn list(&self) -> Result<Vec<Session>> {
        let dir = &self.paths.sessions_dir;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
            let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
            if !entry.path().join("session.json").is_file() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            sessions.push(self.load(&id)?);
        }
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    /// Remove the session directory. Balls keep their tags.
    pub fn delete(&self, id: &str) -> Result<()> {
        let dir = self.paths.session(id).dir;
        if !dir.is_dir() {
            return Err(JuggleError::session_not_found(id).into());
        }
        fs::remove_dir_all(&dir).with_context(|| format!("remove {}", dir.display()))?;
        info!(id, "deleted session");
        Ok(())
    }

    fn write(&self, session: &Session) -> Result<()> {
        let path = self.paths.session(&session.id).session_path;
        let mut buf = serde_json::to_string_pretty(session).context("serialize session")?;
        buf.push('\n');
        super::write_atomic(&path, &buf)
    }
}

fn validate_session_id(id: &str) -> Result<(), JuggleError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(JuggleError::Validation(format!(
            "session id '{id}' must be non-empty and use only [A-Za-z0-9_-]"
        )))
    }
}

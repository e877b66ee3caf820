//! File-backed ball store: `.juggle/balls.jsonl` and its archive.
//!
//! Every operation re-reads the files it touches, so edits made by other
//! processes between calls are picked up. Writes are per-file atomic but not
//! transactional across balls; concurrent writers race and the last write wins.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use jsonschema::Validator;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::core::ball::{Ball, BallState, ModelSize, Priority, Transition};
use crate::core::deps::detect_circular_dependencies;
use crate::core::short_id::resolve_by_prefix;
use crate::error::JuggleError;
use crate::io::init::JugglePaths;
use crate::io::session::Session;

const BALL_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/ball.schema.json"
));

/// Fields for a new ball beyond title and priority.
#[derive(Debug, Clone, Default)]
pub struct NewBall {
    pub title: String,
    pub priority: Priority,
    /// Overrides the session's acceptance criteria when set.
    pub acceptance_criteria: Option<Vec<String>>,
    pub tags: BTreeSet<String>,
    pub depends_on: Vec<String>,
    /// Overrides the session's default model size when set.
    pub model_size: Option<ModelSize>,
    /// Defaults to the project root.
    pub working_dir: Option<PathBuf>,
}

impl NewBall {
    pub fn new(title: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            priority,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Location {
    Active,
    Archived,
}

pub struct BallStore {
    paths: JugglePaths,
    validator: Validator,
}

impl BallStore {
    pub fn open(root: &Path) -> Result<Self> {
        let schema: Value = serde_json::from_str(BALL_SCHEMA).context("parse ball schema")?;
        let validator =
            jsonschema::validator_for(&schema).map_err(|err| anyhow!("invalid ball schema: {err}"))?;
        Ok(Self {
            paths: JugglePaths::new(root),
            validator,
        })
    }

    pub fn paths(&self) -> &JugglePaths {
        &self.paths
    }

    pub fn load_active(&self) -> Result<Vec<Ball>> {
        self.read_balls(&self.paths.balls_path)
    }

    pub fn load_archived(&self) -> Result<Vec<Ball>> {
        self.read_balls(&self.paths.archive_path)
    }

    /// Active balls followed by archived balls.
    pub fn load_all(&self) -> Result<Vec<Ball>> {
        let mut balls = self.load_active()?;
        balls.extend(self.load_archived()?);
        Ok(balls)
    }

    /// Load an active ball by exact id.
    pub fn get(&self, id: &str) -> Result<Ball> {
        self.load_active()?
            .into_iter()
            .find(|ball| ball.id == id)
            .ok_or_else(|| JuggleError::ball_not_found(id).into())
    }

    /// Resolve a full id or unique prefix among active balls.
    pub fn resolve(&self, query: &str) -> Result<Ball> {
        let balls = self.load_active()?;
        Ok(resolve_by_prefix(&balls, query)?.clone())
    }

    /// Resolve a full id or unique prefix among active and archived balls.
    pub fn resolve_any(&self, query: &str) -> Result<Ball> {
        let balls = self.load_all()?;
        Ok(resolve_by_prefix(&balls, query)?.clone())
    }

    /// Every ball tagged with `session_id`, archived ones included.
    pub fn session_balls(&self, session_id: &str) -> Result<Vec<Ball>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|ball| ball.in_session(session_id))
            .collect())
    }

    /// The balls a run works on: the whole session, or the single session
    /// ball matching `filter` (full id or unique prefix).
    pub fn target_balls(&self, session_id: &str, filter: Option<&str>) -> Result<Vec<Ball>> {
        let balls = self.session_balls(session_id)?;
        match filter {
            None => Ok(balls),
            Some(query) => Ok(vec![resolve_by_prefix(&balls, query)?.clone()]),
        }
    }

    pub fn create(&self, title: &str, priority: Priority) -> Result<Ball> {
        self.create_with(NewBall::new(title, priority))
    }

    /// Create a ball under `session`, inheriting its acceptance criteria and
    /// default model size unless `new` overrides them.
    pub fn create_in_session(&self, session: &Session, mut new: NewBall) -> Result<Ball> {
        if new.acceptance_criteria.is_none() && !session.acceptance_criteria.is_empty() {
            new.acceptance_criteria = Some(session.acceptance_criteria.clone());
        }
        if new.model_size.is_none() {
            new.model_size = session.default_model;
        }
        new.tags.insert(session.id.clone());
        self.create_with(new)
    }

    #[instrument(skip_all, fields(title = %new.title))]
    pub fn create_with(&self, new: NewBall) -> Result<Ball> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(JuggleError::Validation("title must not be empty".to_string()).into());
        }

        let mut active = self.load_active()?;
        let existing: BTreeSet<String> = active
            .iter()
            .map(|ball| ball.id.clone())
            .chain(self.load_archived()?.into_iter().map(|ball| ball.id))
            .collect();
        for dep in &new.depends_on {
            if !existing.contains(dep) {
                return Err(JuggleError::ball_not_found(dep.as_str()).into());
            }
        }

        let id = self.allocate_id(title, &existing);
        let working_dir = new.working_dir.unwrap_or_else(|| self.paths.root.clone());
        let mut ball = Ball::new(id, title.to_string(), working_dir, new.priority);
        ball.acceptance_criteria = new.acceptance_criteria.unwrap_or_default();
        ball.tags = new.tags;
        ball.depends_on = new.depends_on;
        ball.model_size = new.model_size;

        active.push(ball.clone());
        self.write_balls(&self.paths.balls_path, &active)?;
        info!(id = %ball.id, "created ball");
        Ok(ball)
    }

    /// Persist `ball`, bumping `update_count` and `last_activity`.
    ///
    /// Updates the record wherever it lives (active or archive); unknown balls
    /// are appended to the active set.
    pub fn save(&self, ball: &mut Ball) -> Result<()> {
        ball.update_count += 1;
        ball.last_activity = Utc::now();

        let location = self.locate(&ball.id)?.unwrap_or(Location::Active);
        let path = self.path_for(location);
        let mut balls = self.read_balls(path)?;
        match balls.iter_mut().find(|b| b.id == ball.id) {
            Some(slot) => *slot = ball.clone(),
            None => balls.push(ball.clone()),
        }
        debug!(id = %ball.id, update_count = ball.update_count, "saved ball");
        self.write_balls(path, &balls)
    }

    /// Remove a ball from whichever set holds it.
    pub fn delete(&self, id: &str) -> Result<Ball> {
        let location = self
            .locate(id)?
            .ok_or_else(|| JuggleError::ball_not_found(id))?;
        let path = self.path_for(location);
        let mut balls = self.read_balls(path)?;
        let index = balls
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| JuggleError::ball_not_found(id))?;
        let removed = balls.remove(index);
        self.write_balls(path, &balls)?;
        info!(id, "deleted ball");
        Ok(removed)
    }

    /// Move `ball` from the active set into the archive.
    ///
    /// The archive is written first so an interrupted move duplicates the
    /// record instead of losing it.
    pub fn archive(&self, ball: &Ball) -> Result<Ball> {
        let mut active = self.load_active()?;
        let index = active
            .iter()
            .position(|b| b.id == ball.id)
            .ok_or_else(|| JuggleError::ball_not_found(ball.id.as_str()))?;
        active.remove(index);

        let mut archived_ball = ball.clone();
        archived_ball.update_count += 1;
        archived_ball.last_activity = Utc::now();

        let mut archived = self.load_archived()?;
        archived.retain(|b| b.id != ball.id);
        archived.push(archived_ball.clone());
        self.write_balls(&self.paths.archive_path, &archived)?;
        self.write_balls(&self.paths.balls_path, &active)?;
        info!(id = %ball.id, "archived ball");
        Ok(archived_ball)
    }

    /// Restore an archived ball to the active set in `pending` state.
    pub fn unarchive(&self, id: &str) -> Result<Ball> {
        let mut archived = self.load_archived()?;
        let Some(index) = archived.iter().position(|b| b.id == id) else {
            if self.locate(id)? == Some(Location::Active) {
                return Err(JuggleError::NotArchived(id.to_string()).into());
            }
            return Err(JuggleError::ball_not_found(id).into());
        };
        let mut ball = archived.remove(index);
        let now = Utc::now();
        ball.restore(now);
        ball.update_count += 1;

        let mut active = self.load_active()?;
        active.retain(|b| b.id != id);
        active.push(ball.clone());
        self.write_balls(&self.paths.balls_path, &active)?;
        self.write_balls(&self.paths.archive_path, &archived)?;
        info!(id, "unarchived ball");
        Ok(ball)
    }

    /// Apply a state transition to an active ball and persist it.
    ///
    /// Completing a ball archives it.
    #[instrument(skip(self))]
    pub fn transition(&self, id: &str, transition: Transition) -> Result<Ball> {
        let mut ball = self.get(id)?;
        ball.apply(transition, Utc::now())?;
        if ball.state == BallState::Complete {
            return self.archive(&ball);
        }
        self.save(&mut ball)?;
        Ok(ball)
    }

    pub fn add_dependency(&self, id: &str, dep: &str) -> Result<Ball> {
        self.mutate_dependencies(id, |deps| {
            if !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        })
    }

    pub fn remove_dependency(&self, id: &str, dep: &str) -> Result<Ball> {
        let ball = self.get(id)?;
        if !ball.depends_on.iter().any(|d| d == dep) {
            return Err(anyhow!("{id} does not depend on {dep}"));
        }
        self.mutate_dependencies(id, |deps| deps.retain(|d| d != dep))
    }

    pub fn set_dependencies(&self, id: &str, deps: Vec<String>) -> Result<Ball> {
        self.mutate_dependencies(id, move |current| *current = deps)
    }

    /// Change `depends_on` for `id`, persisting only if the result is acyclic
    /// and every dependency exists.
    fn mutate_dependencies<F>(&self, id: &str, mutate: F) -> Result<Ball>
    where
        F: FnOnce(&mut Vec<String>),
    {
        let mut all = self.load_all()?;
        let index = all
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| JuggleError::ball_not_found(id))?;

        let mut candidate = all[index].clone();
        mutate(&mut candidate.depends_on);
        let mut seen = BTreeSet::new();
        candidate.depends_on.retain(|dep| seen.insert(dep.clone()));

        for dep in &candidate.depends_on {
            if dep == id {
                return Err(JuggleError::Cycle {
                    path: vec![id.to_string(), id.to_string()],
                }
                .into());
            }
            if !all.iter().any(|b| &b.id == dep) {
                return Err(JuggleError::ball_not_found(dep.as_str()).into());
            }
        }

        all[index] = candidate.clone();
        detect_circular_dependencies(&all)?;

        self.save(&mut candidate)?;
        Ok(candidate)
    }

    fn allocate_id(&self, title: &str, existing: &BTreeSet<String>) -> String {
        let slug = slugify(&self.paths.project_name());
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut attempt: u64 = 0;
        loop {
            let mut hasher = Sha256::new();
            hasher.update(self.paths.project_name().as_bytes());
            hasher.update(title.as_bytes());
            hasher.update(stamp.to_le_bytes());
            hasher.update(attempt.to_le_bytes());
            let digest = hasher.finalize();
            let id = format!("{slug}-{}", hex::encode(&digest[..4]));
            if !existing.contains(&id) {
                return id;
            }
            attempt += 1;
        }
    }

    fn locate(&self, id: &str) -> Result<Option<Location>> {
        if self.load_active()?.iter().any(|b| b.id == id) {
            return Ok(Some(Location::Active));
        }
        if self.load_archived()?.iter().any(|b| b.id == id) {
            return Ok(Some(Location::Archived));
        }
        Ok(None)
    }

    fn path_for(&self, location: Location) -> &Path {
        match location {
            Location::Active => &self.paths.balls_path,
            Location::Archived => &self.paths.archive_path,
        }
    }

    fn read_balls(&self, path: &Path) -> Result<Vec<Ball>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let mut balls = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let lineno = index + 1;
            let value: Value = serde_json::from_str(line)
                .with_context(|| format!("parse {}:{lineno}", path.display()))?;
            self.validate_record(&value)
                .with_context(|| format!("{}:{lineno}", path.display()))?;
            let ball: Ball = serde_json::from_value(value)
                .with_context(|| format!("deserialize {}:{lineno}", path.display()))?;
            balls.push(ball);
        }
        Ok(balls)
    }

    fn write_balls(&self, path: &Path, balls: &[Ball]) -> Result<()> {
        let mut buf = String::new();
        for ball in balls {
            buf.push_str(&serde_json::to_string(ball).context("serialize ball")?);
            buf.push('\n');
        }
        super::write_atomic(path, &buf)
    }

    fn validate_record(&self, value: &Value) -> Result<()> {
        if self.validator.is_valid(value) {
            return Ok(());
        }
        let messages = self
            .validator
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        Err(anyhow!("ball schema validation failed: {}", messages.join("; ")))
    }
}

/// Lowercase, hyphen-separated form of a project name for id prefixes.
fn slugify(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "juggle".to_string()
    } else {
        slug
    }
}

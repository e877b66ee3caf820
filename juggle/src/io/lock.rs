//! Per-session exclusive lock so only one agent loop runs per session.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::JuggleError;

/// Held for the duration of a run. Released on drop.
#[derive(Debug)]
pub struct SessionLock {
    session_id: String,
    path: PathBuf,
    file: Option<File>,
}

impl SessionLock {
    /// Take the lock at `path` for `session_id`.
    ///
    /// Fails with [`JuggleError::AlreadyLocked`] naming the holder's pid when
    /// another process (or another handle in this process) holds it.
    pub fn acquire(path: &Path, session_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("open lock file {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            let holder = match read_holder(&mut file) {
                Some(pid) => format!("pid {pid}"),
                None => "another process".to_string(),
            };
            return Err(JuggleError::AlreadyLocked {
                session: session_id.to_string(),
                holder,
            }
            .into());
        }

        file.set_len(0).context("truncate lock file")?;
        file.seek(SeekFrom::Start(0)).context("seek lock file")?;
        writeln!(file, "{}", std::process::id()).context("write lock holder")?;
        file.flush().context("flush lock file")?;

        debug!(session = session_id, path = %path.display(), "acquired session lock");
        Ok(Self {
            session_id: session_id.to_string(),
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Pid recorded by the current holder of the lock at `path`, if any.
    ///
    /// The file outlives every run; an empty file means nobody holds it.
    pub fn holder(path: &Path) -> Option<String> {
        let mut file = File::open(path).ok()?;
        read_holder(&mut file)
    }

    /// Clear the holder and unlock. Safe to call repeatedly.
    ///
    /// The lock file itself stays in place: every acquirer must flock the
    /// same inode, which unlinking would break.
    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(err) = file.set_len(0) {
            warn!(path = %self.path.display(), err = %err, "failed to clear lock holder");
        }
        if let Err(err) = FileExt::unlock(&file) {
            warn!(path = %self.path.display(), err = %err, "failed to unlock session lock");
        }
        debug!(session = %self.session_id, "released session lock");
    }
}

fn read_holder(file: &mut File) -> Option<String> {
    let mut holder = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut holder).ok()?;
    let holder = holder.trim();
    (!holder.is_empty()).then(|| holder.to_string())
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}

//! Append-only per-session progress log (`sessions/<id>/progress.txt`).
//!
//! Agents append their own notes to this file; the orchestrator appends
//! warnings and lifecycle events. Line counts are the evidence used to gate
//! self-reported signals, so the file is never rewritten or truncated here.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::io::init::JugglePaths;

pub trait ProgressSink {
    fn append(&self, session_id: &str, entry: &str) -> Result<()>;
    fn line_count(&self, session_id: &str) -> Result<usize>;
}

pub struct FileProgressLog {
    paths: JugglePaths,
}

impl FileProgressLog {
    pub fn new(root: &Path) -> Self {
        Self {
            paths: JugglePaths::new(root),
        }
    }

    /// The last `lines` lines of the log, oldest first.
    pub fn tail(&self, session_id: &str, lines: usize) -> Result<Vec<String>> {
        let contents = self.read(session_id)?;
        let all: Vec<&str> = contents.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].iter().map(|line| (*line).to_string()).collect())
    }

    fn read(&self, session_id: &str) -> Result<String> {
        let path = self.paths.session(session_id).progress_path;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }
}

impl ProgressSink for FileProgressLog {
    /// Append one timestamped entry. Multi-line entries are kept on one line
    /// per source line, each carrying the timestamp.
    fn append(&self, session_id: &str, entry: &str) -> Result<()> {
        let path = self.paths.session(session_id).progress_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let mut buf = String::new();
        for line in entry.lines().filter(|l| !l.trim().is_empty()) {
            buf.push_str(&format!("[{stamp}] {line}\n"));
        }
        if buf.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        if !ends_with_newline(&mut file).with_context(|| format!("read {}", path.display()))? {
            buf.insert(0, '\n');
        }
        file.write_all(buf.as_bytes())
            .with_context(|| format!("append {}", path.display()))
    }

    fn line_count(&self, session_id: &str) -> Result<usize> {
        Ok(self.read(session_id)?.lines().count())
    }
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

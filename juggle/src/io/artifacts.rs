//! Per-session run artifacts: last raw agent output and last run result.

use std::fs;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::run::RunResult;
use crate::io::init::SessionPaths;

/// Overwrite `last_output.txt` with the latest iteration's raw output.
pub fn write_last_output(paths: &SessionPaths, output: &str) -> Result<()> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create directory {}", paths.dir.display()))?;
    fs::write(&paths.last_output_path, output)
        .with_context(|| format!("write {}", paths.last_output_path.display()))
}

pub fn read_last_output(paths: &SessionPaths) -> Result<Option<String>> {
    if !paths.last_output_path.exists() {
        return Ok(None);
    }
    fs::read_to_string(&paths.last_output_path)
        .with_context(|| format!("read {}", paths.last_output_path.display()))
        .map(Some)
}

/// Atomically write `last_run.json` (temp file + rename).
pub fn write_last_run(paths: &SessionPaths, result: &RunResult) -> Result<()> {
    debug!(
        path = %paths.last_run_path.display(),
        stop = result.stop.as_str(),
        iterations = result.iterations,
        "writing last run"
    );
    let mut buf = serde_json::to_string_pretty(result).context("serialize run result")?;
    buf.push('\n');
    super::write_atomic(&paths.last_run_path, &buf)
}

pub fn load_last_run(paths: &SessionPaths) -> Result<Option<RunResult>> {
    if !paths.last_run_path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&paths.last_run_path)
        .with_context(|| format!("read {}", paths.last_run_path.display()))?;
    let result = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", paths.last_run_path.display()))?;
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::core::aggregate::AggregateCounts;
    use crate::core::run::RunStop;
    use crate::io::init::JugglePaths;

    #[test]
    fn last_output_is_overwritten() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = JugglePaths::new(temp.path()).session("s1");
        assert_eq!(read_last_output(&paths).expect("read"), None);
        write_last_output(&paths, "first").expect("write");
        write_last_output(&paths, "second").expect("write");
        assert_eq!(read_last_output(&paths).expect("read").as_deref(), Some("second"));
    }

    #[test]
    fn last_run_persists() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = JugglePaths::new(temp.path()).session("s1");
        assert_eq!(load_last_run(&paths).expect("load"), None);

        let now = Utc::now();
        let result = RunResult {
            session_id: "s1".to_string(),
            ball_filter: Some("proj-ab".to_string()),
            iterations: 2,
            stop: RunStop::MaxIterationsReached,
            counts: AggregateCounts {
                terminal: 1,
                complete: 1,
                researched: 0,
                blocked: 0,
                total: 2,
            },
            total_wait: Duration::from_secs(35),
            started_at: now,
            ended_at: now,
        };
        write_last_run(&paths, &result).expect("write");
        assert_eq!(load_last_run(&paths).expect("load"), Some(result));
    }
}

//! Diagnostic tracing for the `juggle` binary.
//!
//! Tracing output is for whoever is debugging juggle itself and goes to
//! stderr only. What the agent did during a run lives in the session's
//! progress log (`.juggle/sessions/<id>/progress.txt`, see
//! [`crate::io::progress_log`]), which is written regardless of `RUST_LOG`.
//!
//! Useful targets:
//!
//! - `juggle::orchestrator`: iteration start/finish, rate-limit waits,
//!   rejected signals, run outcome.
//! - `juggle::io::agent`: agent command, parsed signal, failed exits.
//! - `juggle::io::process`: spawn, timeout kills, truncated output.
//! - `juggle::io::lock`: session lock acquire and release.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber, filtered by `RUST_LOG` (default `warn`).
///
/// ```bash
/// RUST_LOG=juggle::orchestrator=debug,juggle::io::agent=info juggle run auth
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

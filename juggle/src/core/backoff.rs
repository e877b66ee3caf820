//! Rate-limit wait policy.

use std::time::Duration;

/// Added to an explicit retry-after hint.
pub const HINT_BUFFER: Duration = Duration::from_secs(5);
/// First wait when no hint is given.
pub const BASE_WAIT: Duration = Duration::from_secs(30);
/// Upper bound for exponential waits.
pub const MAX_WAIT: Duration = Duration::from_secs(16 * 60);

/// How long to wait before retrying a rate-limited invocation.
///
/// `retry_count` is the number of consecutive rate-limited attempts before
/// this one (0 for the first).
pub fn wait_time(retry_after: Option<Duration>, retry_count: u32) -> Duration {
    if let Some(hint) = retry_after {
        return hint.saturating_add(HINT_BUFFER);
    }
    let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
    BASE_WAIT.saturating_mul(factor).min(MAX_WAIT)
}

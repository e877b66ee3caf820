//! Stable exit codes for juggle CLI commands.

use crate::core::run::RunStop;

/// Command succeeded, or `juggle run` finished with every targeted ball terminal.
pub const OK: i32 = 0;
/// Command failed: bad input, unresolvable id, invalid transition, cycle, held lock,
/// runner failure or any other error.
pub const INVALID: i32 = 1;
/// `juggle run` stopped because the agent reported it is blocked.
pub const BLOCKED: i32 = 2;
/// `juggle run` stopped because an iteration exceeded its timeout.
pub const TIMED_OUT: i32 = 3;
/// `juggle run` stopped because the rate-limit wait budget ran out.
pub const RATE_LIMITED: i32 = 4;
/// `juggle run` used every iteration without a terminal outcome.
pub const MAX_ITERATIONS: i32 = 5;

pub fn for_stop(stop: &RunStop) -> i32 {
    match stop {
        RunStop::Complete => OK,
        RunStop::Blocked { .. } => BLOCKED,
        RunStop::TimedOut { .. } => TIMED_OUT,
        RunStop::RateLimitBudgetExceeded => RATE_LIMITED,
        RunStop::MaxIterationsReached => MAX_ITERATIONS,
    }
}

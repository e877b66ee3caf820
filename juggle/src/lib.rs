//! Session-scoped agent iteration orchestrator.
//!
//! Work is tracked as "balls" grouped into sessions. `juggle run` repeatedly
//! hands a session's balls to an AI coding agent until every targeted ball is
//! terminal, the agent is blocked, or a bound (iterations, timeout,
//! rate-limit wait budget) is hit. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state machine, short ids, cycle
//!   detection, aggregation, backoff, signal parsing). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem stores, session lock,
//!   progress log, process execution, prompt rendering). Isolated behind
//!   traits to enable scripting in tests.
//!
//! [`orchestrator`] composes the two into the iteration loop.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

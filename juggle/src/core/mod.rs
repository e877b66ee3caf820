//! Deterministic, pure logic shared by the juggle core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod aggregate;
pub mod backoff;
pub mod ball;
pub mod deps;
pub mod progress;
pub mod run;
pub mod short_id;
pub mod signals;
pub mod types;

//! Progress validation for agent self-reports.

/// True iff the progress log grew during the iteration.
pub fn progress_advanced(before: usize, after: usize) -> bool {
    after > before
}

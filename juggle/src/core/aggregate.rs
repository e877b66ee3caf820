//! Terminal-state aggregation over a targeted ball set.

use serde::{Deserialize, Serialize};

use crate::core::ball::{Ball, BallState};

/// Counts of balls by finishing state.
///
/// `terminal` is `complete + researched + blocked`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub terminal: usize,
    pub complete: usize,
    pub researched: usize,
    pub blocked: usize,
    pub total: usize,
}

impl AggregateCounts {
    /// Every targeted ball has reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.terminal == self.total
    }
}

/// Count terminal states over `balls`.
pub fn aggregate<'a, I>(balls: I) -> AggregateCounts
where
    I: IntoIterator<Item = &'a Ball>,
{
    let mut counts = AggregateCounts::default();
    for ball in balls {
        counts.total += 1;
        match ball.state {
            BallState::Complete => counts.complete += 1,
            BallState::Researched => counts.researched += 1,
            BallState::Blocked => counts.blocked += 1,
            BallState::Pending | BallState::InProgress => {}
        }
    }
    counts.terminal = counts.complete + counts.researched + counts.blocked;
    counts
}

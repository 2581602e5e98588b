//! Failure scheduling.
//!
//! At the start of every run the harness decides whether this run will abort
//! and, if so, at which sequence index. The abort only fires once a
//! checkpoint has completed in the same run, so recovery always has
//! something to restore from.

use tracing::debug;

use crate::rng::SimRng;

/// Chooses the sequence index of this run's injected failure.
#[derive(Debug)]
pub struct FailureSchedule {
    total: u64,
    rng: SimRng,
}

impl FailureSchedule {
    /// Creates a schedule over a plan of `total` commands.
    pub fn new(total: u64, rng: SimRng) -> Self {
        Self { total, rng }
    }

    /// Returns the index at which to abort, or `None` when the failure
    /// budget is spent or nothing is left to generate.
    ///
    /// The index is uniform in `[cursor_start, total)`.
    pub fn next_failure_index(
        &mut self,
        cursor_start: u64,
        failures_so_far: u32,
        max_failures: u32,
    ) -> Option<u64> {
        if failures_so_far >= max_failures || cursor_start >= self.total {
            debug!(
                cursor_start,
                failures_so_far, max_failures, "no failure scheduled for this run"
            );
            return None;
        }

        let index = self.rng.next_u64_range(cursor_start, self.total);
        debug!(index, cursor_start, total = self.total, "failure scheduled");
        Some(index)
    }
}

/// Returns true when a failure scheduled at `scheduled` must fire before
/// delivering sequence index `position`.
pub fn failure_due(scheduled: Option<u64>, position: u64, checkpoint_completed: bool) -> bool {
    checkpoint_completed && scheduled.is_some_and(|index| position >= index)
}

//! Verification sweeps.

use oncecheck_types::Command;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::HarnessResult;
use crate::executor::CommandExecutor;
use crate::tracker::ShadowStateTracker;

/// How a sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every unit received a `Verify`.
    Complete { units: u32 },
    /// Cancellation was observed after `sent` units.
    Cancelled { sent: u32 },
}

/// Broadcasts one `Verify` per unit, carrying the tracker's prediction.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationSweeper;

impl VerificationSweeper {
    pub fn new() -> Self {
        Self
    }

    /// Runs one sweep over every unit of `tracker`, in unit order.
    ///
    /// Cancellation is checked before each send, so a slow sweep never holds
    /// up shutdown by more than one delivery.
    pub fn sweep_once<E>(
        &self,
        tracker: &ShadowStateTracker,
        executor: &mut E,
        cancel: &CancelToken,
    ) -> HarnessResult<SweepOutcome>
    where
        E: CommandExecutor + ?Sized,
    {
        let mut sent = 0;
        for (unit, expected) in tracker.iter() {
            if cancel.is_cancelled() {
                info!(sent, "verification sweep cancelled");
                return Ok(SweepOutcome::Cancelled { sent });
            }
            executor.deliver(unit, Command::verify(expected))?;
            sent += 1;
        }

        debug!(units = sent, "verification sweep complete");
        Ok(SweepOutcome::Complete { units: sent })
    }
}

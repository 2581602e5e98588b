//! Workload driver: generation, fault injection, and verification.
//!
//! The driver is a three-state machine:
//!
//! ```text
//! GENERATING ──(cursor == total)──> VERIFYING ──┐
//!     │  ▲                              │  ▲     │ sweep, idle, repeat
//!     └──┘ deliver one tree             │  └─────┘
//!     │                                 │
//!     └─────────── cancel ──────────────┴──────> CANCELLED
//! ```
//!
//! # Critical section
//!
//! The cursor, the failure count, and the shadow tracker live behind one
//! mutex. Delivering a tree, committing its effect to the tracker, and
//! advancing the cursor happen while that mutex is held, and
//! [`HarnessHandle::snapshot`] takes the same mutex. A snapshot therefore
//! never sees a cursor that is ahead of (or behind) the tracker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use oncecheck_config::HarnessConfig;
use oncecheck_types::UnitId;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{HarnessError, HarnessResult};
use crate::executor::CommandExecutor;
use crate::failure::{FailureSchedule, failure_due};
use crate::generator::RandomCommandTree;
use crate::rng::SimRng;
use crate::snapshot::{HarnessSnapshot, SnapshotError};
use crate::sweeper::{SweepOutcome, VerificationSweeper};
use crate::tracker::ShadowStateTracker;

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a [`WorkloadDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Generating,
    Verifying,
    Cancelled,
}

/// Result of one [`WorkloadDriver::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The tree at sequence `index` was delivered to `target`.
    Delivered { index: u64, target: UnitId },
    /// The cursor reached the planned total; the driver now verifies.
    GenerationComplete { cursor: u64 },
    /// Sweep number `sweep` (1-based) reached every unit.
    Swept { sweep: u64, units: u32 },
    /// Cancellation was observed. Every later step returns this too.
    Cancelled,
}

/// Generation progress as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub cursor: u64,
    pub total: u64,
    pub failures_injected: u32,
}

/// Final counters of a driver that stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cursor: u64,
    pub failures_injected: u32,
    pub sweeps: u64,
}

/// Values guarded by the critical section.
#[derive(Debug)]
struct Cycle {
    cursor: u64,
    failures_injected: u32,
    tracker: ShadowStateTracker,
}

#[derive(Debug)]
struct Shared {
    cycle: Mutex<Cycle>,
    checkpoint_completed: AtomicBool,
    cancel: CancelToken,
    total: u64,
}

impl Shared {
    fn lock(&self) -> HarnessResult<MutexGuard<'_, Cycle>> {
        self.cycle.lock().map_err(|_| HarnessError::StatePoisoned)
    }
}

// ============================================================================
// Host-facing handle
// ============================================================================

/// Thread-safe handle used by the host runtime while the driver runs.
#[derive(Debug, Clone)]
pub struct HarnessHandle {
    shared: Arc<Shared>,
}

impl HarnessHandle {
    /// Captures `(cursor, failures, tracker)` atomically.
    ///
    /// Still serviced after cancellation.
    pub fn snapshot(&self) -> HarnessResult<HarnessSnapshot> {
        let cycle = self.shared.lock()?;
        let total = self.shared.total;
        if cycle.cursor < total {
            info!(
                sent = cycle.cursor,
                total,
                percent = cycle.cursor * 100 / total,
                "generation progress"
            );
        }
        Ok(HarnessSnapshot {
            cursor: cycle.cursor,
            failures_injected: cycle.failures_injected,
            tracker: cycle.tracker.snapshot(),
        })
    }

    /// Marks that a checkpoint containing this instance's snapshot is
    /// durable. Arms the scheduled failure.
    pub fn notify_checkpoint_complete(&self, checkpoint_id: u64) {
        debug!(checkpoint_id, "checkpoint complete");
        self.shared.checkpoint_completed.store(true, Ordering::Release);
    }

    /// Requests cancellation. The driver stops at its next step boundary or
    /// before the next per-unit `Verify`.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn progress(&self) -> HarnessResult<Progress> {
        let cycle = self.shared.lock()?;
        Ok(Progress {
            cursor: cycle.cursor,
            total: self.shared.total,
            failures_injected: cycle.failures_injected,
        })
    }

    /// Expected counter of `unit` according to the shadow tracker.
    pub fn expected_state(&self, unit: UnitId) -> HarnessResult<u64> {
        self.shared.lock()?.tracker.value_of(unit)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Drives one run of the harness from a restored snapshot.
///
/// A driver instance corresponds to one process instance of the generator:
/// after an [`HarnessError::InjectedFailure`] it must be discarded and a new
/// one built with [`WorkloadDriver::restore`] from the last durable snapshot.
#[derive(Debug)]
pub struct WorkloadDriver {
    config: HarnessConfig,
    shared: Arc<Shared>,
    generator: RandomCommandTree,
    sweeper: VerificationSweeper,
    scheduled_failure: Option<u64>,
    state: DriverState,
    sweeps: u64,
}

impl WorkloadDriver {
    /// Starts a fresh run with no prior snapshot.
    pub fn new(config: HarnessConfig) -> HarnessResult<Self> {
        Self::restore(config, HarnessSnapshot::default())
    }

    /// Starts a run from `snapshot`.
    ///
    /// Decides this run's failure index once. When a failure is scheduled
    /// the failure count is incremented immediately, so every snapshot of
    /// this run already accounts for it.
    pub fn restore(config: HarnessConfig, snapshot: HarnessSnapshot) -> HarnessResult<Self> {
        config.validate()?;

        let total = config.message_count;
        if snapshot.cursor > total {
            return Err(SnapshotError::Inconsistent(format!(
                "cursor {} is beyond the planned total {total}",
                snapshot.cursor
            ))
            .into());
        }
        let tracker = ShadowStateTracker::restore(config.number_of_units, &snapshot.tracker)?;

        let seed = config
            .seed
            .unwrap_or_else(|| SimRng::from_entropy().seed());
        let mut rng = SimRng::derive(
            seed,
            &[snapshot.cursor, u64::from(snapshot.failures_injected)],
        );

        let scheduled_failure = FailureSchedule::new(total, rng.fork()).next_failure_index(
            snapshot.cursor,
            snapshot.failures_injected,
            config.max_failures,
        );
        let failures_injected = snapshot.failures_injected + u32::from(scheduled_failure.is_some());

        info!(
            start = snapshot.cursor,
            failure_at = ?scheduled_failure,
            total,
            seed,
            "starting workload generation"
        );

        let generator = RandomCommandTree::new(&config, rng);
        let shared = Arc::new(Shared {
            cycle: Mutex::new(Cycle {
                cursor: snapshot.cursor,
                failures_injected,
                tracker,
            }),
            checkpoint_completed: AtomicBool::new(false),
            cancel: CancelToken::new(),
            total,
        });

        Ok(Self {
            config,
            shared,
            generator,
            sweeper: VerificationSweeper::new(),
            scheduled_failure,
            state: DriverState::Generating,
            sweeps: 0,
        })
    }

    pub fn handle(&self) -> HarnessHandle {
        HarnessHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Sequence index at which this run aborts, if any.
    pub fn scheduled_failure(&self) -> Option<u64> {
        self.scheduled_failure
    }

    /// Completed sweeps in this run.
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    /// Performs exactly one transition of the state machine.
    ///
    /// Returns [`HarnessError::InjectedFailure`] when the scheduled abort
    /// fires; any other error is a real failure and must not be retried.
    pub fn step<E>(&mut self, executor: &mut E) -> HarnessResult<Step>
    where
        E: CommandExecutor + ?Sized,
    {
        match self.state {
            DriverState::Generating => self.generate_one(executor),
            DriverState::Verifying => self.sweep(executor),
            DriverState::Cancelled => Ok(Step::Cancelled),
        }
    }

    /// Steps until cancelled, idling between phases.
    ///
    /// Waits `idle_before_verify` once generation completes and
    /// `sweep_interval` after every sweep. Both waits return early on
    /// cancellation.
    pub fn run<E>(&mut self, executor: &mut E) -> HarnessResult<RunSummary>
    where
        E: CommandExecutor + ?Sized,
    {
        loop {
            match self.step(executor)? {
                Step::Delivered { .. } => {}
                Step::GenerationComplete { .. } => {
                    self.shared.cancel.wait_for(self.config.idle_before_verify());
                }
                Step::Swept { .. } => {
                    self.shared.cancel.wait_for(self.config.sweep_interval());
                }
                Step::Cancelled => return self.summary(),
            }
        }
    }

    /// Current counters of this run.
    pub fn summary(&self) -> HarnessResult<RunSummary> {
        let cycle = self.shared.lock()?;
        Ok(RunSummary {
            cursor: cycle.cursor,
            failures_injected: cycle.failures_injected,
            sweeps: self.sweeps,
        })
    }

    fn generate_one<E>(&mut self, executor: &mut E) -> HarnessResult<Step>
    where
        E: CommandExecutor + ?Sized,
    {
        let mut cycle = self.shared.lock()?;
        if self.shared.cancel.is_cancelled() {
            drop(cycle);
            return Ok(self.cancelled());
        }

        let index = cycle.cursor;
        if index >= self.shared.total {
            self.state = DriverState::Verifying;
            info!(cursor = index, "generation complete, verifying");
            return Ok(Step::GenerationComplete { cursor: index });
        }

        let checkpoint_completed = self.shared.checkpoint_completed.load(Ordering::Acquire);
        if failure_due(self.scheduled_failure, index, checkpoint_completed) {
            warn!(
                index,
                failures_injected = cycle.failures_injected,
                "injecting failure"
            );
            return Err(HarnessError::InjectedFailure { index });
        }

        let command = self.generator.generate();
        let target = UnitId::new((index % u64::from(self.config.number_of_units)) as u32);

        // The tracker and cursor move only once delivery succeeded.
        let effect = cycle.tracker.effect_of(&command, target)?;
        executor.deliver(target, command)?;
        cycle.tracker.commit(&effect);
        cycle.cursor = index + 1;

        Ok(Step::Delivered { index, target })
    }

    fn sweep<E>(&mut self, executor: &mut E) -> HarnessResult<Step>
    where
        E: CommandExecutor + ?Sized,
    {
        if self.shared.cancel.is_cancelled() {
            return Ok(self.cancelled());
        }

        let tracker = self.shared.lock()?.tracker.clone();
        match self
            .sweeper
            .sweep_once(&tracker, executor, &self.shared.cancel)?
        {
            SweepOutcome::Complete { units } => {
                self.sweeps += 1;
                Ok(Step::Swept {
                    sweep: self.sweeps,
                    units,
                })
            }
            SweepOutcome::Cancelled { .. } => Ok(self.cancelled()),
        }
    }

    fn cancelled(&mut self) -> Step {
        if self.state != DriverState::Cancelled {
            info!(from = ?self.state, sweeps = self.sweeps, "workload driver cancelled");
            self.state = DriverState::Cancelled;
        }
        Step::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{DeliveryError, RecordingExecutor};
    use oncecheck_types::Command;

    struct RefusingExecutor;

    impl CommandExecutor for RefusingExecutor {
        fn deliver(&mut self, _target: UnitId, _command: Command) -> Result<(), DeliveryError> {
            Err(DeliveryError::Transport("connection reset".to_string()))
        }
    }

    fn config(messages: u64) -> HarnessConfig {
        HarnessConfig {
            number_of_units: 3,
            message_count: messages,
            command_depth: 3,
            seed: Some(17),
            idle_before_verify_ms: 0,
            sweep_interval_ms: 1,
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn batches_target_units_round_robin() {
        let mut driver = WorkloadDriver::new(HarnessConfig {
            max_failures: 0,
            ..config(7)
        })
        .expect("valid config");
        let mut recorder = RecordingExecutor::new();

        let mut targets = Vec::new();
        while let Step::Delivered { target, .. } = driver.step(&mut recorder).expect("step") {
            targets.push(u32::from(target));
        }
        assert_eq!(targets, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(driver.state(), DriverState::Verifying);
    }

    #[test]
    fn snapshot_tracks_delivered_prefix() {
        let mut driver = WorkloadDriver::new(HarnessConfig {
            max_failures: 0,
            ..config(5)
        })
        .expect("valid config");
        let handle = driver.handle();
        let mut recorder = RecordingExecutor::new();

        driver.step(&mut recorder).expect("step");
        driver.step(&mut recorder).expect("step");

        let snapshot = handle.snapshot().expect("snapshot");
        assert_eq!(snapshot.cursor, 2);

        let mut expected = ShadowStateTracker::new(3);
        for delivery in recorder.deliveries() {
            expected
                .apply(&delivery.command, delivery.target)
                .expect("in range");
        }
        assert_eq!(snapshot.tracker, expected.snapshot());
    }

    #[test]
    fn failure_counted_when_scheduled() {
        let driver = WorkloadDriver::new(config(50)).expect("valid config");
        assert!(driver.scheduled_failure().is_some());
        let progress = driver.handle().progress().expect("progress");
        assert_eq!(progress.failures_injected, 1);
        assert_eq!(progress.total, 50);
    }

    #[test]
    fn spent_budget_schedules_nothing() {
        let snapshot = HarnessSnapshot {
            cursor: 10,
            failures_injected: 1,
            tracker: Default::default(),
        };
        let driver = WorkloadDriver::restore(config(50), snapshot).expect("valid snapshot");
        assert_eq!(driver.scheduled_failure(), None);
        assert_eq!(driver.handle().progress().expect("progress").cursor, 10);
    }

    #[test]
    fn restore_rejects_cursor_beyond_total() {
        let snapshot = HarnessSnapshot {
            cursor: 51,
            ..HarnessSnapshot::default()
        };
        let err = WorkloadDriver::restore(config(50), snapshot).expect_err("cursor too large");
        assert!(matches!(
            err,
            HarnessError::Snapshot(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn invalid_config_never_starts() {
        let err = WorkloadDriver::new(HarnessConfig {
            number_of_units: 0,
            ..config(5)
        })
        .expect_err("zero units");
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn cancel_is_terminal() {
        let mut driver = WorkloadDriver::new(config(5)).expect("valid config");
        let mut recorder = RecordingExecutor::new();
        driver.handle().cancel();

        assert_eq!(driver.step(&mut recorder).expect("step"), Step::Cancelled);
        assert_eq!(driver.step(&mut recorder).expect("step"), Step::Cancelled);
        assert_eq!(driver.state(), DriverState::Cancelled);
        assert!(recorder.is_empty());

        // Snapshots are still serviced after cancellation.
        assert_eq!(driver.handle().snapshot().expect("snapshot").cursor, 0);
    }

    #[test]
    fn verifying_sweeps_every_unit() {
        let mut driver = WorkloadDriver::new(HarnessConfig {
            max_failures: 0,
            ..config(2)
        })
        .expect("valid config");
        let mut recorder = RecordingExecutor::new();

        while driver.state() == DriverState::Generating {
            driver.step(&mut recorder).expect("step");
        }
        let before = recorder.len();
        assert_eq!(
            driver.step(&mut recorder).expect("step"),
            Step::Swept { sweep: 1, units: 3 }
        );
        let verifies: Vec<_> = recorder.deliveries()[before..]
            .iter()
            .map(|delivery| delivery.command.clone())
            .collect();
        assert!(verifies.iter().all(|c| matches!(c, Command::Verify { .. })));
        assert_eq!(verifies.len(), 3);
    }

    #[test]
    fn failed_delivery_leaves_progress_untouched() {
        let mut driver = WorkloadDriver::new(
            HarnessConfig {
                number_of_units: 1,
                max_failures: 0,
                ..config(5)
            }
            .with_state_modification_only(),
        )
        .expect("valid config");
        let handle = driver.handle();

        let err = driver.step(&mut RefusingExecutor).expect_err("transport down");
        assert!(matches!(err, HarnessError::Delivery(_)));

        let snapshot = handle.snapshot().expect("snapshot");
        assert_eq!(snapshot.cursor, 0);
        assert!(snapshot.tracker.is_empty());

        // The same position is retried with a working executor.
        let mut recorder = RecordingExecutor::new();
        assert_eq!(
            driver.step(&mut recorder).expect("step"),
            Step::Delivered {
                index: 0,
                target: UnitId::new(0)
            }
        );
        let snapshot = handle.snapshot().expect("snapshot");
        assert_eq!(snapshot.cursor, 1);
        assert_eq!(snapshot.tracker.get(&UnitId::new(0)), Some(&1));
    }
}

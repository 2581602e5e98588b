//! In-process host runtime.
//!
//! [`LocalRuntime`] plays the role of the checkpointing stream processor the
//! harness normally runs inside. It owns a [`LocalCluster`] of units, takes
//! aligned checkpoints of the cluster and the harness snapshot together,
//! and restarts the driver from the last checkpoint when the injected
//! failure fires.
//!
//! Time is logical: one tick elapses per delivered tree, `SendAfter` delays
//! are measured in ticks (one per millisecond), and async completions resolve
//! on the tick after they were registered.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use oncecheck_config::HarnessConfig;
use oncecheck_types::{Command, UnitId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::driver::{Step, WorkloadDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::executor::{CommandExecutor, DeliveryError};
use crate::interpreter::{CommandInterpreter, Context};
use crate::snapshot::{MemorySnapshotStore, SnapshotStore};

// ============================================================================
// Cluster
// ============================================================================

/// Checkpointable unit state.
#[derive(Debug, Clone)]
struct ClusterState {
    counters: Vec<u64>,
    /// Keyed by `(due tick, sequence)` so equal deadlines keep FIFO order.
    timers: BTreeMap<(u64, u64), (UnitId, Command)>,
    pending_async: VecDeque<(UnitId, Vec<Command>)>,
    egress_records: u64,
    tick: u64,
    next_timer_seq: u64,
}

impl ClusterState {
    fn new(number_of_units: u32) -> Self {
        Self {
            counters: vec![0; number_of_units as usize],
            timers: BTreeMap::new(),
            pending_async: VecDeque::new(),
            egress_records: 0,
            tick: 0,
            next_timer_seq: 0,
        }
    }
}

/// A set of units executing commands with the reference interpreter.
///
/// Every accepted delivery is processed until the mailbox is empty, so the
/// cluster is quiescent between deliveries apart from pending timers and
/// async completions.
#[derive(Debug)]
pub struct LocalCluster {
    interpreter: CommandInterpreter,
    state: ClusterState,
    mailbox: VecDeque<(UnitId, Command)>,
    deliveries: u64,
}

impl LocalCluster {
    pub fn new(number_of_units: u32) -> Self {
        Self {
            interpreter: CommandInterpreter::new(number_of_units),
            state: ClusterState::new(number_of_units),
            mailbox: VecDeque::new(),
            deliveries: 0,
        }
    }

    /// Real counter of `unit`.
    pub fn counter(&self, unit: UnitId) -> Option<u64> {
        self.state.counters.get(unit.as_index()).copied()
    }

    pub fn counters(&self) -> &[u64] {
        &self.state.counters
    }

    pub fn egress_records(&self) -> u64 {
        self.state.egress_records
    }

    /// Commands accepted through [`CommandExecutor::deliver`].
    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    pub fn tick(&self) -> u64 {
        self.state.tick
    }

    /// Returns true when no timer or async completion is outstanding.
    pub fn is_quiescent(&self) -> bool {
        self.mailbox.is_empty()
            && self.state.timers.is_empty()
            && self.state.pending_async.is_empty()
    }

    /// Advances logical time by one tick and processes everything that
    /// became due.
    pub fn advance_tick(&mut self) -> Result<(), DeliveryError> {
        self.state.tick = self.state.tick.saturating_add(1);
        self.release_due()
    }

    /// Runs logical time forward until no timer or async completion is left.
    pub fn flush(&mut self) -> Result<(), DeliveryError> {
        while !self.is_quiescent() {
            let next_due = self.state.timers.keys().next().map(|(due, _)| *due);
            let next_tick = self.state.tick.saturating_add(1);
            self.state.tick = match next_due {
                Some(due) if self.state.pending_async.is_empty() => due.max(next_tick),
                _ => next_tick,
            };
            self.release_due()?;
        }
        Ok(())
    }

    fn release_due(&mut self) -> Result<(), DeliveryError> {
        for (unit, commands) in std::mem::take(&mut self.state.pending_async) {
            self.mailbox.extend(commands.into_iter().map(|command| (unit, command)));
        }
        while let Some(entry) = self.state.timers.first_entry() {
            if entry.key().0 > self.state.tick {
                break;
            }
            self.mailbox.push_back(entry.remove());
        }
        self.drain()
    }

    fn drain(&mut self) -> Result<(), DeliveryError> {
        let interpreter = self.interpreter;
        while let Some((unit, command)) = self.mailbox.pop_front() {
            let ClusterState {
                counters,
                timers,
                pending_async,
                egress_records,
                tick,
                next_timer_seq,
            } = &mut self.state;
            let counter = counters
                .get_mut(unit.as_index())
                .ok_or(DeliveryError::UnknownUnit(unit))?;

            let mut ctx = UnitContext {
                unit,
                tick: *tick,
                mailbox: &mut self.mailbox,
                timers,
                next_timer_seq,
                pending_async,
                egress_records,
            };
            interpreter.interpret(counter, &mut ctx, command)?;
        }
        Ok(())
    }

    fn restore(&mut self, state: ClusterState) {
        self.state = state;
        self.mailbox.clear();
    }
}

impl CommandExecutor for LocalCluster {
    fn deliver(&mut self, target: UnitId, command: Command) -> Result<(), DeliveryError> {
        if self.counter(target).is_none() {
            return Err(DeliveryError::UnknownUnit(target));
        }
        self.deliveries += 1;
        self.mailbox.push_back((target, command));
        self.drain()
    }
}

/// Host services for the unit currently executing.
struct UnitContext<'a> {
    unit: UnitId,
    tick: u64,
    mailbox: &'a mut VecDeque<(UnitId, Command)>,
    timers: &'a mut BTreeMap<(u64, u64), (UnitId, Command)>,
    next_timer_seq: &'a mut u64,
    pending_async: &'a mut VecDeque<(UnitId, Vec<Command>)>,
    egress_records: &'a mut u64,
}

impl Context for UnitContext<'_> {
    fn self_unit(&self) -> UnitId {
        self.unit
    }

    fn send(&mut self, target: UnitId, command: Command) {
        self.mailbox.push_back((target, command));
    }

    fn send_after(&mut self, delay: Duration, target: UnitId, command: Command) {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let due = self.tick.saturating_add(delay_ms);
        let seq = *self.next_timer_seq;
        *self.next_timer_seq += 1;
        self.timers.insert((due, seq), (target, command));
    }

    fn send_egress(&mut self) {
        *self.egress_records += 1;
    }

    fn register_async(&mut self, commands: Vec<Command>) {
        self.pending_async.push_back((self.unit, commands));
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// Settings of the in-process host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalRuntimeConfig {
    /// Delivered trees between two checkpoints.
    pub checkpoint_every: u64,
    /// Sweeps to run before cancelling the driver.
    pub sweeps: u64,
}

impl Default for LocalRuntimeConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 100,
            sweeps: 2,
        }
    }
}

/// Outcome of a [`LocalRuntime::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub units: u32,
    pub planned: u64,
    pub cursor: u64,
    pub failures_injected: u32,
    pub restarts: u32,
    pub checkpoints: u64,
    pub sweeps: u64,
    pub deliveries: u64,
    pub egress_records: u64,
    /// Sum of every unit's expected counter.
    pub expected_total: u64,
}

/// Runs the harness end to end against a [`LocalCluster`].
#[derive(Debug)]
pub struct LocalRuntime {
    harness: HarnessConfig,
    config: LocalRuntimeConfig,
    cluster: LocalCluster,
    store: MemorySnapshotStore,
    checkpoint: Option<ClusterState>,
    report: RunReport,
}

impl LocalRuntime {
    pub fn new(harness: HarnessConfig, config: LocalRuntimeConfig) -> HarnessResult<Self> {
        harness.validate()?;
        Ok(Self {
            cluster: LocalCluster::new(harness.number_of_units),
            report: RunReport {
                units: harness.number_of_units,
                planned: harness.message_count,
                ..RunReport::default()
            },
            harness,
            config,
            store: MemorySnapshotStore::new(),
            checkpoint: None,
        })
    }

    pub fn cluster(&self) -> &LocalCluster {
        &self.cluster
    }

    /// Generates the whole workload, recovering from injected failures,
    /// then verifies the configured number of sweeps.
    ///
    /// Fails on the first consistency violation or any non-injected error.
    pub fn run(&mut self) -> HarnessResult<RunReport> {
        let mut driver = WorkloadDriver::new(self.harness.clone())?;
        let checkpoint_every = self.config.checkpoint_every.max(1);
        let mut since_checkpoint = 0;

        loop {
            match driver.step(&mut self.cluster) {
                Ok(Step::Delivered { .. }) => {
                    self.cluster.advance_tick()?;
                    since_checkpoint += 1;
                    if since_checkpoint >= checkpoint_every {
                        self.checkpoint(&driver)?;
                        since_checkpoint = 0;
                    }
                }
                Ok(Step::GenerationComplete { cursor }) => {
                    self.cluster.flush()?;
                    debug!(cursor, tick = self.cluster.tick(), "in-flight work drained");
                    if self.config.sweeps == 0 {
                        driver.handle().cancel();
                    }
                }
                Ok(Step::Swept { sweep, units }) => {
                    self.report.sweeps += 1;
                    debug!(sweep, units, "sweep verified");
                    if sweep >= self.config.sweeps {
                        driver.handle().cancel();
                    }
                }
                Ok(Step::Cancelled) => break,
                Err(HarnessError::InjectedFailure { index }) => {
                    self.report.restarts += 1;
                    warn!(
                        index,
                        restarts = self.report.restarts,
                        "instance failed, restoring last checkpoint"
                    );
                    driver = self.recover()?;
                    since_checkpoint = 0;
                }
                Err(err) => return Err(err),
            }
        }

        let snapshot = driver.handle().snapshot()?;
        self.report.cursor = snapshot.cursor;
        self.report.failures_injected = snapshot.failures_injected;
        self.report.expected_total = snapshot.tracker.values().sum();
        self.report.deliveries = self.cluster.deliveries();
        self.report.egress_records = self.cluster.egress_records();

        info!(
            cursor = self.report.cursor,
            restarts = self.report.restarts,
            checkpoints = self.report.checkpoints,
            sweeps = self.report.sweeps,
            "run finished"
        );
        Ok(self.report.clone())
    }

    /// Takes an aligned checkpoint of the harness and the cluster.
    fn checkpoint(&mut self, driver: &WorkloadDriver) -> HarnessResult<()> {
        let handle = driver.handle();
        let snapshot = handle.snapshot()?;
        self.store.store(&snapshot)?;
        self.checkpoint = Some(self.cluster.state.clone());
        self.report.checkpoints += 1;
        handle.notify_checkpoint_complete(self.report.checkpoints);
        Ok(())
    }

    fn recover(&mut self) -> HarnessResult<WorkloadDriver> {
        let snapshot = self.store.load_or_default()?;
        let state = self
            .checkpoint
            .clone()
            .unwrap_or_else(|| ClusterState::new(self.harness.number_of_units));
        self.cluster.restore(state);
        WorkloadDriver::restore(self.harness.clone(), snapshot)
    }
}

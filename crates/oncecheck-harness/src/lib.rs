//! # oncecheck-harness: Exactly-once verification harness
//!
//! This crate generates a long randomized workload of nested commands,
//! predicts its effect with a shadow model, deliberately kills itself once
//! after a checkpoint has completed, and finally sweeps every unit with a
//! `Verify` carrying the predicted counter. Any unit whose real counter
//! disagrees reveals lost or duplicated processing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       WorkloadDriver                         │
//! │  ┌──────────────────┐ ┌────────────────────┐ ┌─────────────┐ │
//! │  │ RandomCommandTree│ │ ShadowStateTracker │ │FailureSched.│ │
//! │  └────────┬─────────┘ └─────────┬──────────┘ └──────┬──────┘ │
//! │           └──────── critical section (cursor) ──────┘        │
//! │                              │                               │
//! │                   VerificationSweeper                        │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ deliver(unit, command)
//!                     ┌──────────▼──────────┐
//!                     │   CommandExecutor   │  (host runtime)
//!                     └─────────────────────┘
//! ```
//!
//! The host talks back through a [`HarnessHandle`]: it requests snapshots,
//! signals completed checkpoints, and cancels. [`LocalRuntime`] is an
//! in-process host that wires all of this together for local runs and tests.
//!
//! ## Example
//!
//! ```ignore
//! use oncecheck_config::HarnessConfig;
//! use oncecheck_harness::{LocalRuntime, LocalRuntimeConfig};
//!
//! let mut runtime = LocalRuntime::new(HarnessConfig::local(), LocalRuntimeConfig::default())?;
//! let report = runtime.run()?;
//! assert_eq!(report.cursor, report.planned);
//! ```

mod cancel;
mod driver;
mod error;
mod executor;
mod failure;
mod generator;
mod interpreter;
mod local_runtime;
mod rng;
mod snapshot;
mod sweeper;
mod tracker;

pub use cancel::CancelToken;
pub use driver::{DriverState, HarnessHandle, Progress, RunSummary, Step, WorkloadDriver};
pub use error::{ConsistencyViolation, HarnessError, HarnessResult};
pub use executor::{CommandExecutor, Delivery, DeliveryError, RecordingExecutor};
pub use failure::{FailureSchedule, failure_due};
pub use generator::RandomCommandTree;
pub use interpreter::{CommandInterpreter, Context};
pub use local_runtime::{LocalCluster, LocalRuntime, LocalRuntimeConfig, RunReport};
pub use rng::SimRng;
pub use snapshot::{HarnessSnapshot, MemorySnapshotStore, SnapshotError, SnapshotStore};
pub use sweeper::{SweepOutcome, VerificationSweeper};
pub use tracker::{ShadowEffect, ShadowStateTracker};

// Re-export the shared vocabulary so hosts need a single dependency.
pub use oncecheck_config::{CommandProbabilities, HarnessConfig};
pub use oncecheck_types::{Command, UnitId};

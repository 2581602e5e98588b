//! The delivery seam between the harness and the host runtime.

use std::sync::{Arc, Mutex, PoisonError};

use oncecheck_types::{Command, UnitId};
use thiserror::Error;

use crate::error::ConsistencyViolation;

/// Errors returned by a [`CommandExecutor`].
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A `Verify` found a counter that disagrees with the shadow model.
    #[error(transparent)]
    Violation(#[from] ConsistencyViolation),

    #[error("unit {0} does not exist")]
    UnknownUnit(UnitId),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Delivers a command to a unit inside the host runtime.
///
/// Each call delivers one command; the host guarantees per-unit ordering of
/// the calls it accepts.
pub trait CommandExecutor {
    fn deliver(&mut self, target: UnitId, command: Command) -> Result<(), DeliveryError>;
}

/// One command accepted by a [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub target: UnitId,
    pub command: Command,
}

/// Executor that records every delivery without executing it.
///
/// Clones share the same log, so a test can keep one clone while the driver
/// runs with another on a different thread.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every delivery so far, in order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `Verify` commands recorded.
    pub fn verify_count(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|delivery| matches!(delivery.command, Command::Verify { .. }))
            .count()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn deliver(&mut self, target: UnitId, command: Command) -> Result<(), DeliveryError> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Delivery { target, command });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_log() {
        let recorder = RecordingExecutor::new();
        let mut sender = recorder.clone();
        sender
            .deliver(UnitId::new(1), Command::StateModification)
            .expect("recording never fails");
        sender
            .deliver(UnitId::new(0), Command::verify(1))
            .expect("recording never fails");

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.verify_count(), 1);
        assert_eq!(
            recorder.deliveries()[0],
            Delivery {
                target: UnitId::new(1),
                command: Command::StateModification,
            }
        );
    }
}

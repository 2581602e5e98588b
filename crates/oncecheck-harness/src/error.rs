//! Harness error types.
//!
//! The variants follow the failure taxonomy of the harness: one deliberate
//! failure (`InjectedFailure`), the detection signal (`ConsistencyViolation`),
//! startup rejection (`Config`), and programming errors (`UnitOutOfRange`).
//! Nothing here is retried; every error propagates to the process boundary.

use oncecheck_config::ConfigError;
use oncecheck_types::UnitId;
use serde::Serialize;
use thiserror::Error;

use crate::executor::DeliveryError;
use crate::snapshot::SnapshotError;

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// A unit's real counter disagrees with the shadow model's prediction.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("unit {unit} expected state {expected} but holds {actual}")]
pub struct ConsistencyViolation {
    pub unit: UnitId,
    pub expected: u64,
    pub actual: u64,
}

/// Errors that can occur while generating, delivering, or verifying.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Scheduled abort of this instance. The host restarts from the last
    /// completed checkpoint.
    #[error("injected failure at sequence index {index}")]
    InjectedFailure { index: u64 },

    /// Actual unit state disagrees with the shadow model.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(ConsistencyViolation),

    /// Malformed or out-of-range configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A command addressed a unit outside `[0, number_of_units)`.
    #[error("unit {unit} out of range for {number_of_units} units")]
    UnitOutOfRange { unit: UnitId, number_of_units: u32 },

    /// Snapshot encoding, decoding, or restore failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The executor rejected a delivery.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A thread panicked while holding the progress lock.
    #[error("harness state lock poisoned")]
    StatePoisoned,
}

impl HarnessError {
    /// Returns true for the one failure the harness manufactures itself.
    pub fn is_injected_failure(&self) -> bool {
        matches!(self, HarnessError::InjectedFailure { .. })
    }
}

impl From<DeliveryError> for HarnessError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Violation(violation) => HarnessError::ConsistencyViolation(violation),
            other => HarnessError::Delivery(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_maps_to_consistency_variant() {
        let violation = ConsistencyViolation {
            unit: UnitId::new(3),
            expected: 4,
            actual: 5,
        };
        let err = HarnessError::from(DeliveryError::Violation(violation.clone()));
        match err {
            HarnessError::ConsistencyViolation(got) => assert_eq!(got, violation),
            other => panic!("expected ConsistencyViolation, got {other:?}"),
        }
    }

    #[test]
    fn only_injected_failure_is_flagged() {
        assert!(HarnessError::InjectedFailure { index: 1 }.is_injected_failure());
        assert!(!HarnessError::StatePoisoned.is_injected_failure());
    }
}

//! Harness snapshot record.
//!
//! The record holds exactly the three values that must survive a restart:
//! the cursor, the failure count, and the shadow tracker. It is encoded with
//! postcard and handed to the host runtime's checkpoint as an opaque blob.

use std::collections::BTreeMap;

use oncecheck_types::UnitId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while encoding, decoding, or storing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to encode snapshot: {0}")]
    Encode(postcard::Error),

    #[error("failed to decode snapshot: {0}")]
    Decode(postcard::Error),

    #[error("snapshot is inconsistent with the configuration: {0}")]
    Inconsistent(String),
}

/// Durable harness state captured at a checkpoint.
///
/// An absent record restores as `{cursor: 0, failures_injected: 0, tracker:
/// empty}`, which is [`HarnessSnapshot::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessSnapshot {
    /// Number of commands already delivered.
    pub cursor: u64,
    /// Failures scheduled so far, across all runs.
    pub failures_injected: u32,
    /// Non-zero expected counters.
    pub tracker: BTreeMap<UnitId, u64>,
}

impl HarnessSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        postcard::to_allocvec(self).map_err(SnapshotError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        postcard::from_bytes(bytes).map_err(SnapshotError::Decode)
    }
}

/// Storage for the most recent snapshot record.
pub trait SnapshotStore {
    /// Persists `snapshot`, replacing any previous record.
    fn store(&mut self, snapshot: &HarnessSnapshot) -> Result<(), SnapshotError>;

    /// Returns the last stored record, if any.
    fn load(&self) -> Result<Option<HarnessSnapshot>, SnapshotError>;

    /// Returns the last stored record, or the empty record.
    fn load_or_default(&self) -> Result<HarnessSnapshot, SnapshotError> {
        Ok(self.load()?.unwrap_or_default())
    }
}

/// Keeps the encoded record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    bytes: Option<Vec<u8>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn store(&mut self, snapshot: &HarnessSnapshot) -> Result<(), SnapshotError> {
        self.bytes = Some(snapshot.to_bytes()?);
        Ok(())
    }

    fn load(&self) -> Result<Option<HarnessSnapshot>, SnapshotError> {
        self.bytes
            .as_deref()
            .map(HarnessSnapshot::from_bytes)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_loads_default() {
        let store = MemorySnapshotStore::new();
        assert_eq!(store.load().expect("load"), None);
        assert_eq!(
            store.load_or_default().expect("load"),
            HarnessSnapshot::default()
        );
    }

    #[test]
    fn store_replaces_previous_record() {
        let mut store = MemorySnapshotStore::new();
        let first = HarnessSnapshot {
            cursor: 3,
            failures_injected: 0,
            tracker: BTreeMap::from([(UnitId::new(0), 3)]),
        };
        let second = HarnessSnapshot {
            cursor: 10,
            failures_injected: 1,
            tracker: BTreeMap::from([(UnitId::new(0), 4), (UnitId::new(2), 6)]),
        };
        store.store(&first).expect("store");
        store.store(&second).expect("store");
        assert_eq!(store.load().expect("load"), Some(second));
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let snapshot = HarnessSnapshot {
            cursor: 1_000_000,
            failures_injected: 2,
            tracker: BTreeMap::from([(UnitId::new(7), 99)]),
        };
        let bytes = snapshot.to_bytes().expect("encode");
        let err = HarnessSnapshot::from_bytes(&bytes[..bytes.len() - 1])
            .expect_err("truncated record");
        assert!(matches!(err, SnapshotError::Decode(_)));
    }
}

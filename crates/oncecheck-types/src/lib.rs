//! # oncecheck-types: Core types for the exactly-once harness
//!
//! This crate defines the vocabulary shared between the workload side
//! (generator, shadow tracker, driver) and the executor side (the stateful
//! units inside the host runtime):
//!
//! - [`UnitId`]: address of one independently-addressable stateful unit
//! - [`Command`]: the recursive command grammar delivered to units

use std::fmt::Display;

use serde::{Deserialize, Serialize};

mod command;

pub use command::Command;

// ============================================================================
// Entity IDs
// ============================================================================

/// Identifier of one stateful unit, in `[0, number_of_units)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct UnitId(u32);

impl UnitId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the id as a `usize` for indexing per-unit tables.
    pub fn as_index(self) -> usize {
        self.0 as usize
    }

    /// Returns true if this unit exists in a runtime with `number_of_units` units.
    pub fn is_within(self, number_of_units: u32) -> bool {
        self.0 < number_of_units
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UnitId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<UnitId> for u32 {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

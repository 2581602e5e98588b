//! Shadow model of the expected per-unit state.
//!
//! The tracker predicts, for every unit, how many `StateModification`
//! commands it should have executed exactly once. It is only ever advanced
//! together with the cursor, under the driver's progress lock.

use std::collections::BTreeMap;

use oncecheck_types::{Command, UnitId};

use crate::error::{HarnessError, HarnessResult};

/// Counter increments of one command tree, checked against the unit range.
///
/// Produced by [`ShadowStateTracker::effect_of`]; only a tracker of the same
/// size may commit it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowEffect {
    increments: BTreeMap<UnitId, u64>,
}

impl ShadowEffect {
    /// Number of `StateModification` leaves the tree contributes.
    pub fn state_modifications(&self) -> u64 {
        self.increments.values().sum()
    }
}

/// Per-unit expected counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowStateTracker {
    counters: Vec<u64>,
}

impl ShadowStateTracker {
    /// Creates a tracker with every counter at zero.
    pub fn new(number_of_units: u32) -> Self {
        Self {
            counters: vec![0; number_of_units as usize],
        }
    }

    pub fn number_of_units(&self) -> u32 {
        self.counters.len() as u32
    }

    /// Records the effect of delivering `command` to `target`.
    ///
    /// Every `StateModification` in the tree increments the counter of the
    /// unit that executes it. The whole tree is checked before any counter
    /// moves, so a rejected tree leaves the tracker unchanged.
    pub fn apply(&mut self, command: &Command, target: UnitId) -> HarnessResult<()> {
        let effect = self.effect_of(command, target)?;
        self.commit(&effect);
        Ok(())
    }

    /// Computes the increments `command` delivered to `target` will cause,
    /// without touching any counter.
    pub fn effect_of(&self, command: &Command, target: UnitId) -> HarnessResult<ShadowEffect> {
        self.check_targets(command, target)?;

        let mut increments = BTreeMap::new();
        command.for_each_target(target, &mut |unit, node| {
            if matches!(node, Command::StateModification) {
                *increments.entry(unit).or_insert(0) += 1;
            }
        });
        Ok(ShadowEffect { increments })
    }

    /// Adds a previously computed effect to the counters.
    pub fn commit(&mut self, effect: &ShadowEffect) {
        for (unit, count) in &effect.increments {
            self.counters[unit.as_index()] += count;
        }
    }

    /// Returns the expected counter of `unit`.
    pub fn value_of(&self, unit: UnitId) -> HarnessResult<u64> {
        self.counters
            .get(unit.as_index())
            .copied()
            .ok_or(HarnessError::UnitOutOfRange {
                unit,
                number_of_units: self.number_of_units(),
            })
    }

    /// Iterates over every unit with its expected counter, in unit order.
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, u64)> + '_ {
        self.counters
            .iter()
            .enumerate()
            .map(|(index, value)| (UnitId::new(index as u32), *value))
    }

    /// Returns the non-zero counters.
    pub fn snapshot(&self) -> BTreeMap<UnitId, u64> {
        self.iter().filter(|(_, value)| *value > 0).collect()
    }

    /// Rebuilds a tracker from [`snapshot`](Self::snapshot) output.
    ///
    /// Units missing from the map restore to zero.
    pub fn restore(number_of_units: u32, counters: &BTreeMap<UnitId, u64>) -> HarnessResult<Self> {
        let mut tracker = Self::new(number_of_units);
        for (unit, value) in counters {
            if !unit.is_within(number_of_units) {
                return Err(HarnessError::UnitOutOfRange {
                    unit: *unit,
                    number_of_units,
                });
            }
            tracker.counters[unit.as_index()] = *value;
        }
        Ok(tracker)
    }

    fn check_targets(&self, command: &Command, target: UnitId) -> HarnessResult<()> {
        let number_of_units = self.number_of_units();
        let mut out_of_range = None;
        command.for_each_target(target, &mut |unit, _| {
            if out_of_range.is_none() && !unit.is_within(number_of_units) {
                out_of_range = Some(unit);
            }
        });

        match out_of_range {
            Some(unit) => Err(HarnessError::UnitOutOfRange {
                unit,
                number_of_units,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_state_modification_increments_target() {
        let mut tracker = ShadowStateTracker::new(3);
        tracker
            .apply(&Command::StateModification, UnitId::new(1))
            .expect("in range");
        assert_eq!(tracker.value_of(UnitId::new(1)).expect("in range"), 1);
        assert_eq!(tracker.value_of(UnitId::new(0)).expect("in range"), 0);
    }

    #[test]
    fn forwarded_modifications_land_on_child_target() {
        let mut tracker = ShadowStateTracker::new(3);
        let tree = Command::Send {
            target: UnitId::new(2),
            commands: vec![
                Command::StateModification,
                Command::Noop,
                Command::AsyncSend {
                    commands: vec![Command::StateModification],
                },
            ],
        };
        tracker.apply(&tree, UnitId::new(0)).expect("in range");
        assert_eq!(tracker.value_of(UnitId::new(0)).expect("in range"), 0);
        assert_eq!(tracker.value_of(UnitId::new(2)).expect("in range"), 2);
        assert_eq!(tracker.snapshot().values().sum::<u64>(), 2);
    }

    #[test]
    fn out_of_range_tree_leaves_tracker_untouched() {
        let mut tracker = ShadowStateTracker::new(2);
        let tree = Command::Send {
            target: UnitId::new(1),
            commands: vec![
                Command::StateModification,
                Command::Send {
                    target: UnitId::new(9),
                    commands: vec![Command::StateModification],
                },
            ],
        };
        let err = tracker.apply(&tree, UnitId::new(0)).expect_err("unit 9 is out of range");
        assert!(matches!(
            err,
            HarnessError::UnitOutOfRange { number_of_units: 2, .. }
        ));
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn effect_is_not_visible_until_committed() {
        let mut tracker = ShadowStateTracker::new(2);
        let tree = Command::Send {
            target: UnitId::new(1),
            commands: vec![Command::StateModification, Command::StateModification],
        };

        let effect = tracker.effect_of(&tree, UnitId::new(0)).expect("in range");
        assert_eq!(effect.state_modifications(), 2);
        assert!(tracker.snapshot().is_empty());

        tracker.commit(&effect);
        assert_eq!(tracker.value_of(UnitId::new(1)).expect("in range"), 2);
    }

    #[test]
    fn value_of_rejects_unknown_unit() {
        let tracker = ShadowStateTracker::new(2);
        assert!(tracker.value_of(UnitId::new(2)).is_err());
    }

    #[test]
    fn snapshot_omits_zero_counters() {
        let mut tracker = ShadowStateTracker::new(4);
        tracker
            .apply(&Command::StateModification, UnitId::new(3))
            .expect("in range");
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&UnitId::new(3)), Some(&1));

        let restored = ShadowStateTracker::restore(4, &snapshot).expect("valid snapshot");
        assert_eq!(restored, tracker);
    }

    #[test]
    fn restore_rejects_unit_beyond_range() {
        let counters = BTreeMap::from([(UnitId::new(5), 1)]);
        assert!(ShadowStateTracker::restore(5, &counters).is_err());
    }
}

//! The recursive command grammar.
//!
//! A generated unit of work is a tree of [`Command`]s. Leaves either mutate
//! the receiving unit's counter, do nothing, or emit to the external sink.
//! Interior nodes forward their children to another unit, optionally after a
//! delay or after an asynchronous completion.

use serde::{Deserialize, Serialize};

use crate::UnitId;

/// One command addressed to a unit.
///
/// The unit that receives a command is implicit (the delivery address). The
/// children of `Send` and `SendAfter` execute at `target`; the children of
/// `AsyncSend` execute at the receiving unit once the async operation
/// completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Increment the receiving unit's persisted counter by one.
    StateModification,

    /// Forward each child to `target`.
    Send {
        /// Unit that executes the children.
        target: UnitId,
        /// Child commands, delivered in order.
        commands: Vec<Command>,
    },

    /// Forward each child to `target` after `delay_ms`.
    SendAfter {
        /// Unit that executes the children.
        target: UnitId,
        /// Scheduling delay applied by the executor.
        delay_ms: u64,
        /// Child commands, delivered in order.
        commands: Vec<Command>,
    },

    /// Deliver each child back to the receiving unit once an externally
    /// resolved operation completes.
    AsyncSend {
        /// Child commands, delivered in order on completion.
        commands: Vec<Command>,
    },

    /// No effect.
    Noop,

    /// Emit one record to the external sink. No state effect.
    SendToExternalSink,

    /// Assert the receiving unit's counter equals `expected`.
    Verify {
        /// Counter value predicted by the shadow model.
        expected: u64,
    },
}

impl Command {
    /// Creates a `Verify` command.
    pub fn verify(expected: u64) -> Self {
        Command::Verify { expected }
    }

    /// Returns the nested child commands (empty for leaves).
    pub fn children(&self) -> &[Command] {
        match self {
            Command::Send { commands, .. }
            | Command::SendAfter { commands, .. }
            | Command::AsyncSend { commands } => commands,
            Command::StateModification
            | Command::Noop
            | Command::SendToExternalSink
            | Command::Verify { .. } => &[],
        }
    }

    /// Returns the unit that executes this command's children, given the unit
    /// that executes the command itself.
    pub fn child_target(&self, current: UnitId) -> UnitId {
        match self {
            Command::Send { target, .. } | Command::SendAfter { target, .. } => *target,
            _ => current,
        }
    }

    /// Nesting depth of the tree rooted here. A leaf has depth 0.
    pub fn depth(&self) -> usize {
        self.children()
            .iter()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Largest number of children held by any node of the tree.
    pub fn max_fan_out(&self) -> usize {
        self.children()
            .iter()
            .map(Command::max_fan_out)
            .fold(self.children().len(), usize::max)
    }

    /// Visits every node of the tree together with the unit that executes it,
    /// in delivery order (parent before children, children left to right).
    pub fn for_each_target<F>(&self, current: UnitId, f: &mut F)
    where
        F: FnMut(UnitId, &Command),
    {
        f(current, self);
        let next = self.child_target(current);
        for child in self.children() {
            child.for_each_target(next, f);
        }
    }

    /// Number of `StateModification` leaves in the tree.
    pub fn state_modification_count(&self) -> u64 {
        let mut count = 0;
        self.for_each_target(UnitId::default(), &mut |_, command| {
            if matches!(command, Command::StateModification) {
                count += 1;
            }
        });
        count
    }
}

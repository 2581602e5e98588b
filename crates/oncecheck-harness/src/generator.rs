//! Random command tree generation.
//!
//! Each call to [`RandomCommandTree::generate`] draws one command tree from
//! the configured probabilities. Depth and fan-out are bounded by
//! `command_depth` and `max_commands_per_depth`; once the depth budget is
//! spent the generator emits a `StateModification` leaf.

use oncecheck_config::{CommandProbabilities, HarnessConfig};
use oncecheck_types::{Command, UnitId};

use crate::rng::SimRng;

/// Kind of command drawn at one node, in the order of
/// [`CommandProbabilities::as_array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    StateModification,
    Send,
    SendAfter,
    AsyncSend,
    Noop,
    SendToExternalSink,
}

const KINDS: [CommandKind; 6] = [
    CommandKind::StateModification,
    CommandKind::Send,
    CommandKind::SendAfter,
    CommandKind::AsyncSend,
    CommandKind::Noop,
    CommandKind::SendToExternalSink,
];

/// Generator of random command trees.
///
/// Pure with respect to harness state: it only consumes its own random
/// stream, so the same seed and configuration produce the same sequence of
/// trees.
#[derive(Debug)]
pub struct RandomCommandTree {
    rng: SimRng,
    weights: [f64; 6],
    command_depth: u32,
    max_commands_per_depth: u32,
    number_of_units: u32,
    max_send_after_delay_ms: u64,
}

impl RandomCommandTree {
    pub fn new(config: &HarnessConfig, rng: SimRng) -> Self {
        Self::with_probabilities(config, config.probabilities(), rng)
    }

    /// Creates a generator with explicit weights, overriding the
    /// configuration's probabilities.
    pub fn with_probabilities(
        config: &HarnessConfig,
        probabilities: CommandProbabilities,
        rng: SimRng,
    ) -> Self {
        Self {
            rng,
            weights: probabilities.as_array(),
            command_depth: config.command_depth,
            max_commands_per_depth: config.max_commands_per_depth.max(1),
            number_of_units: config.number_of_units.max(1),
            max_send_after_delay_ms: config.max_send_after_delay_ms.max(1),
        }
    }

    /// Generates one command tree.
    pub fn generate(&mut self) -> Command {
        self.command(self.command_depth)
    }

    fn command(&mut self, remaining_depth: u32) -> Command {
        if remaining_depth == 0 {
            return Command::StateModification;
        }

        match self.draw_kind() {
            CommandKind::StateModification => Command::StateModification,
            CommandKind::Noop => Command::Noop,
            CommandKind::SendToExternalSink => Command::SendToExternalSink,
            CommandKind::Send => Command::Send {
                target: self.random_unit(),
                commands: self.children(remaining_depth - 1),
            },
            CommandKind::SendAfter => Command::SendAfter {
                target: self.random_unit(),
                delay_ms: self.rng.next_u64_inclusive(1, self.max_send_after_delay_ms),
                commands: self.children(remaining_depth - 1),
            },
            CommandKind::AsyncSend => Command::AsyncSend {
                commands: self.children(remaining_depth - 1),
            },
        }
    }

    fn children(&mut self, remaining_depth: u32) -> Vec<Command> {
        let count = 1 + self.rng.next_usize(self.max_commands_per_depth as usize);
        (0..count).map(|_| self.command(remaining_depth)).collect()
    }

    fn random_unit(&mut self) -> UnitId {
        UnitId::new(self.rng.next_usize(self.number_of_units as usize) as u32)
    }

    fn draw_kind(&mut self) -> CommandKind {
        let roll = self.rng.next_f64();
        let mut cumulative = 0.0;
        let mut last_positive = CommandKind::StateModification;

        for (kind, weight) in KINDS.iter().zip(self.weights) {
            if weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            last_positive = *kind;
            if roll < cumulative {
                return *kind;
            }
        }

        // Rounding left the cumulative sum just below 1.
        last_positive
    }
}

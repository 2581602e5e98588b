//! Reference command interpreter for the executor side.
//!
//! A correct executor applies each command to one unit's counter and hands
//! forwarded children back to its host through a [`Context`]. The
//! interpreter is the single place that defines those semantics; the
//! in-process runtime and any external host share it.

use std::time::Duration;

use oncecheck_types::{Command, UnitId};
use tracing::error;

use crate::error::ConsistencyViolation;
use crate::executor::DeliveryError;

/// Host services available to the unit executing a command.
pub trait Context {
    /// Unit currently executing.
    fn self_unit(&self) -> UnitId;

    /// Enqueues `command` for `target`, after everything already enqueued.
    fn send(&mut self, target: UnitId, command: Command);

    /// Enqueues `command` for `target` once `delay` has elapsed.
    fn send_after(&mut self, delay: Duration, target: UnitId, command: Command);

    /// Emits one record to the external sink.
    fn send_egress(&mut self);

    /// Registers an asynchronous operation. On completion each of `commands`
    /// is delivered back to the current unit.
    fn register_async(&mut self, commands: Vec<Command>);
}

/// Applies commands to unit counters.
#[derive(Debug, Clone, Copy)]
pub struct CommandInterpreter {
    number_of_units: u32,
}

impl CommandInterpreter {
    pub fn new(number_of_units: u32) -> Self {
        Self { number_of_units }
    }

    /// Executes `command` against `state`, the counter of `ctx.self_unit()`.
    pub fn interpret<C>(
        &self,
        state: &mut u64,
        ctx: &mut C,
        command: Command,
    ) -> Result<(), DeliveryError>
    where
        C: Context + ?Sized,
    {
        match command {
            Command::StateModification => *state += 1,
            Command::Send { target, commands } => {
                self.check(target)?;
                for child in commands {
                    ctx.send(target, child);
                }
            }
            Command::SendAfter {
                target,
                delay_ms,
                commands,
            } => {
                self.check(target)?;
                let delay = Duration::from_millis(delay_ms);
                for child in commands {
                    ctx.send_after(delay, target, child);
                }
            }
            Command::AsyncSend { commands } => ctx.register_async(commands),
            Command::Noop => {}
            Command::SendToExternalSink => ctx.send_egress(),
            Command::Verify { expected } => {
                if *state != expected {
                    let violation = ConsistencyViolation {
                        unit: ctx.self_unit(),
                        expected,
                        actual: *state,
                    };
                    error!(
                        unit = %violation.unit,
                        expected,
                        actual = *state,
                        "consistency violation detected"
                    );
                    return Err(violation.into());
                }
            }
        }
        Ok(())
    }

    fn check(&self, target: UnitId) -> Result<(), DeliveryError> {
        if target.is_within(self.number_of_units) {
            Ok(())
        } else {
            Err(DeliveryError::UnknownUnit(target))
        }
    }
}

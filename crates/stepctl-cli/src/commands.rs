//! Stepper command table and [`Dispatcher`].
//!
//! Every handler resolves its device first, validates its arguments, and
//! only then touches the driver.  Handlers come in three shapes:
//!
//! | Shape | Commands |
//! |---|---|
//! | synchronous action | `enable`, `set_max_velocity`, `set_micro_step_res`, `set_actual_position`, `enable_constant_velocity_mode` |
//! | asynchronous motion | `move`, `set_target_position` |
//! | multi-field query | `info` |
//!
//! Asynchronous motion commands return as soon as the driver accepts the
//! request; completion is reported later by the [`Notifier`] listener.

use std::sync::Arc;

use stepctl_hal::{CompletionChannel, DeviceRegistry, Stepper};
use stepctl_types::StepperError;
use tracing::debug;

use crate::notifier::Notifier;
use crate::output::OutputSink;
use crate::parse;

const ARG_DEVICE: usize = 0;
const ARG_PARAM: usize = 1;
const ARG_VALUE: usize = 2;

/// Signature shared by all command handlers.  `args` excludes the command
/// name and holds at least [`Command::min_args`] entries.
type Handler = fn(&Invocation<'_>, &[&str]) -> Result<(), StepperError>;

/// Immutable command descriptor.
pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    /// Required positional arguments, not counting the command name.
    pub min_args: usize,
    handler: Handler,
}

/// All stepper commands, in the order `help` lists them.
pub static COMMANDS: &[Command] = &[
    Command {
        name: "enable",
        usage: "<device> <on/off>",
        help: "energise or release the motor",
        min_args: 2,
        handler: cmd_enable,
    },
    Command {
        name: "move",
        usage: "<device> <micro_steps>",
        help: "relative move, reports completion asynchronously",
        min_args: 2,
        handler: cmd_move,
    },
    Command {
        name: "set_max_velocity",
        usage: "<device> <velocity>",
        help: "maximum velocity in micro-steps per second",
        min_args: 2,
        handler: cmd_set_max_velocity,
    },
    Command {
        name: "set_micro_step_res",
        usage: "<device> <resolution>",
        help: "micro-steps per full step (1, 2, 4 … 256)",
        min_args: 2,
        handler: cmd_set_micro_step_res,
    },
    Command {
        name: "set_actual_position",
        usage: "<device> <position>",
        help: "redefine the current position",
        min_args: 2,
        handler: cmd_set_actual_position,
    },
    Command {
        name: "set_target_position",
        usage: "<device> <micro_steps>",
        help: "absolute move, reports completion asynchronously",
        min_args: 2,
        handler: cmd_set_target_position,
    },
    Command {
        name: "enable_constant_velocity_mode",
        usage: "<device> <direction> <velocity>",
        help: "run continuously; velocity 0 stops",
        min_args: 3,
        handler: cmd_enable_constant_velocity_mode,
    },
    Command {
        name: "info",
        usage: "<device>",
        help: "position, resolution and motion status",
        min_args: 1,
        handler: cmd_info,
    },
];

/// Look up a command by name.
pub fn find(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|cmd| cmd.name == name)
}

/// Context of one command invocation.
pub struct Invocation<'a> {
    registry: &'a DeviceRegistry,
    notifier: &'a Notifier,
    async_notifications: bool,
    sink: &'a Arc<dyn OutputSink>,
}

impl<'a> Invocation<'a> {
    fn device(&self, args: &[&str]) -> Result<&'a dyn Stepper, StepperError> {
        self.registry.get(args[ARG_DEVICE])
    }

    /// Make sure the listener runs and arm the shared channel.  Returns the
    /// channel to hand to the driver, or `None` when asynchronous
    /// notifications are switched off.
    ///
    /// The channel is armed before the driver sees the request, so a request
    /// the driver then rejects leaves it `Armed` until the next arm or signal.
    fn prepare_completion(&self) -> Result<Option<Arc<CompletionChannel>>, StepperError> {
        if !self.async_notifications {
            return Ok(None);
        }
        self.notifier.ensure_started(Arc::clone(self.sink))?;
        let channel = self.notifier.channel();
        channel.arm();
        Ok(Some(Arc::clone(channel)))
    }
}

/// Routes command names to handlers and reports failures to the sink.
pub struct Dispatcher<'a> {
    registry: &'a DeviceRegistry,
    notifier: &'a Notifier,
    async_notifications: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        registry: &'a DeviceRegistry,
        notifier: &'a Notifier,
        async_notifications: bool,
    ) -> Self {
        Self {
            registry,
            notifier,
            async_notifications,
        }
    }

    /// Run command `name` with positional `args`.
    ///
    /// Any failure is written to `sink` as a single error line and returned;
    /// [`StepperError::code`] gives the status code.
    pub fn execute(
        &self,
        name: &str,
        args: &[&str],
        sink: &Arc<dyn OutputSink>,
    ) -> Result<(), StepperError> {
        let result = self.run(name, args, sink);
        if let Err(e) = &result {
            debug!(command = name, code = e.code(), error = %e, "command failed");
            sink.error(&e.to_string());
        }
        result
    }

    /// Split `line` on whitespace and run it.  A leading `stepper` word is
    /// accepted and ignored.  Blank lines succeed without doing anything.
    pub fn execute_line(&self, line: &str, sink: &Arc<dyn OutputSink>) -> Result<(), StepperError> {
        let mut words: Vec<&str> = line.split_whitespace().collect();
        if words.first() == Some(&"stepper") {
            words.remove(0);
        }
        match words.split_first() {
            Some((name, args)) => self.execute(name, args, sink),
            None => Ok(()),
        }
    }

    fn run(&self, name: &str, args: &[&str], sink: &Arc<dyn OutputSink>) -> Result<(), StepperError> {
        let command = find(name).ok_or_else(|| StepperError::UnknownCommand(name.to_string()))?;
        if args.len() < command.min_args {
            return Err(StepperError::MissingArguments {
                command: command.name.to_string(),
                usage: command.usage.to_string(),
            });
        }
        let invocation = Invocation {
            registry: self.registry,
            notifier: self.notifier,
            async_notifications: self.async_notifications,
            sink,
        };
        (command.handler)(&invocation, args)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_enable(inv: &Invocation<'_>, args: &[&str]) -> Result<(), StepperError> {
    let device = inv.device(args)?;
    let enable = parse::on_off(args[ARG_PARAM])?;
    device.enable(enable)
}

fn cmd_move(inv: &Invocation<'_>, args: &[&str]) -> Result<(), StepperError> {
    let device = inv.device(args)?;
    let micro_steps = parse::lenient_i32(args[ARG_PARAM]);
    let signal = inv.prepare_completion()?;
    device.move_by(micro_steps, signal)
}

fn cmd_set_max_velocity(inv: &Invocation<'_>, args: &[&str]) -> Result<(), StepperError> {
    let device = inv.device(args)?;
    let velocity = parse::lenient_u32(args[ARG_PARAM]);
    device.set_max_velocity(velocity)
}

fn cmd_set_micro_step_res(inv: &Invocation<'_>, args: &[&str]) -> Result<(), StepperError> {
    let device = inv.device(args)?;
    let resolution = parse::resolution(args[ARG_PARAM])?;
    device.set_micro_step_res(resolution)
}

fn cmd_set_actual_position(inv: &Invocation<'_>, args: &[&str]) -> Result<(), StepperError> {
    let device = inv.device(args)?;
    let position = parse::lenient_i32(args[ARG_PARAM]);
    device.set_actual_position(position)
}

fn cmd_set_target_position(inv: &Invocation<'_>, args: &[&str]) -> Result<(), StepperError> {
    let device = inv.device(args)?;
    let position = parse::lenient_i32(args[ARG_PARAM]);
    let signal = inv.prepare_completion()?;
    device.set_target_position(position, signal)
}

fn cmd_enable_constant_velocity_mode(
    inv: &Invocation<'_>,
    args: &[&str],
) -> Result<(), StepperError> {
    let device = inv.device(args)?;
    let direction = parse::direction(args[ARG_PARAM])?;
    let velocity = parse::lenient_u32(args[ARG_VALUE]);
    device.enable_constant_velocity_mode(direction, velocity)
}

/// Print every field that can be read; a failed field is a warning, never a
/// command failure.
fn cmd_info(inv: &Invocation<'_>, args: &[&str]) -> Result<(), StepperError> {
    let device = inv.device(args)?;
    let sink = inv.sink;

    sink.print("Stepper Info:");
    sink.print(&format!("Device: {}", device.name()));

    match device.actual_position() {
        Ok(position) => sink.print(&format!("Actual Position: {position}")),
        Err(e) => sink.warn(&format!("Failed to get actual position: {}", e.code())),
    }

    match device.micro_step_res() {
        Ok(resolution) => sink.print(&format!("Micro-step Resolution: {resolution}")),
        Err(e) => sink.warn(&format!("Failed to get micro-step resolution: {}", e.code())),
    }

    match device.is_moving() {
        Ok(moving) => sink.print(&format!(
            "Is Moving: {}",
            if moving { "Yes" } else { "No" }
        )),
        Err(e) => sink.warn(&format!("Failed to check if the motor is moving: {}", e.code())),
    }

    Ok(())
}

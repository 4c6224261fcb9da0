//! REPL – Read-Eval-Print Loop for the stepctl interactive shell.
//!
//! Besides the stepper commands the shell understands:
//!   help          – show the command list
//!   devices       – list bound devices
//!   quit | exit   – leave the shell
//!
//! Tab completes command names in the first position and bound device names
//! in the second.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Context, Editor, Helper, Highlighter, Hinter, Validator};
use stepctl_hal::DeviceRegistry;
use tracing::debug;

use crate::commands::{self, COMMANDS, Dispatcher};
use crate::output::OutputSink;

const PROMPT: &str = "stepctl> ";
const BUILTINS: [&str; 4] = ["help", "devices", "quit", "exit"];

/// Line-editor helper providing command and device-name completion.
#[derive(Helper, Highlighter, Hinter, Validator)]
pub struct ShellHelper {
    registry: Arc<DeviceRegistry>,
}

impl ShellHelper {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, candidates) = complete(&self.registry, &line[..pos]);
        let pairs = candidates
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate,
            })
            .collect();
        Ok((start, pairs))
    }
}

/// Completion candidates for the word ending at the end of `before_cursor`.
///
/// Returns the byte offset where that word starts and the matching
/// candidates: command names for the first word, device names for the
/// second word of a stepper command.
pub fn complete(registry: &DeviceRegistry, before_cursor: &str) -> (usize, Vec<String>) {
    let start = before_cursor
        .rfind(char::is_whitespace)
        .map_or(0, |idx| idx + 1);
    let prefix = &before_cursor[start..];

    let mut words: Vec<&str> = before_cursor[..start].split_whitespace().collect();
    if words.first() == Some(&"stepper") {
        words.remove(0);
    }

    let candidates = match words.as_slice() {
        [] => COMMANDS
            .iter()
            .map(|cmd| cmd.name)
            .chain(BUILTINS)
            .filter(|name| name.starts_with(prefix))
            .map(str::to_string)
            .collect(),
        [command] if commands::find(command).is_some() => registry
            .device_names()
            .filter(|name| name.starts_with(prefix))
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    (start, candidates)
}

/// What the loop should do after a line.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(
    registry: Arc<DeviceRegistry>,
    dispatcher: &Dispatcher<'_>,
    sink: &Arc<dyn OutputSink>,
    shutdown: Arc<AtomicBool>,
) -> rustyline::Result<()> {
    let mut editor: Editor<ShellHelper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(ShellHelper::new(Arc::clone(&registry))));

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = editor.add_history_entry(line) {
            debug!(error = %e, "failed to record history entry");
        }

        if handle_line(line, &registry, dispatcher, sink) == Flow::Quit {
            shutdown.store(true, Ordering::SeqCst);
            break;
        }
    }
    Ok(())
}

fn handle_line(
    line: &str,
    registry: &DeviceRegistry,
    dispatcher: &Dispatcher<'_>,
    sink: &Arc<dyn OutputSink>,
) -> Flow {
    match line {
        "help" => cmd_help(sink.as_ref()),
        "devices" => cmd_devices(registry, sink.as_ref()),
        "quit" | "exit" => {
            sink.print("Goodbye.");
            return Flow::Quit;
        }
        other => {
            // Failures are already written to the sink by the dispatcher.
            if let Err(e) = dispatcher.execute_line(other, sink) {
                debug!(code = e.code(), "command returned an error status");
            }
        }
    }
    Flow::Continue
}

fn cmd_help(sink: &dyn OutputSink) {
    sink.print("Stepper commands:");
    for command in COMMANDS {
        sink.print(&format!(
            "  {} {} – {}",
            command.name, command.usage, command.help
        ));
    }
    sink.print("Shell:");
    sink.print("  devices – list bound devices");
    sink.print("  help – show this list");
    sink.print("  quit | exit – leave the shell");
}

fn cmd_devices(registry: &DeviceRegistry, sink: &dyn OutputSink) {
    if registry.is_empty() {
        sink.warn("No stepper devices bound.");
        return;
    }
    for name in registry.device_names() {
        sink.print(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{DEFAULT_LISTENER_STACK_SIZE, Notifier};
    use crate::output::testing::{Level, MemorySink};
    use stepctl_hal::SimRegistry;

    fn registry() -> DeviceRegistry {
        SimRegistry::new()
            .with_stepper("stepper0")
            .with_stepper("stepper1")
            .with_stepper("x_axis")
            .build()
    }

    #[test]
    fn completes_command_names_at_line_start() {
        let (start, candidates) = complete(&registry(), "set_m");
        assert_eq!(start, 0);
        assert_eq!(candidates, vec!["set_max_velocity", "set_micro_step_res"]);

        let (_, candidates) = complete(&registry(), "");
        assert_eq!(candidates.len(), COMMANDS.len() + BUILTINS.len());
    }

    #[test]
    fn completes_device_names_after_command() {
        let (start, candidates) = complete(&registry(), "move step");
        assert_eq!(start, 5);
        assert_eq!(candidates, vec!["stepper0", "stepper1"]);

        let (_, candidates) = complete(&registry(), "stepper info ");
        assert_eq!(candidates, vec!["stepper0", "stepper1", "x_axis"]);
    }

    #[test]
    fn no_device_completion_for_unknown_command_or_later_words() {
        assert!(complete(&registry(), "spin st").1.is_empty());
        assert!(complete(&registry(), "move stepper0 1").1.is_empty());
        assert!(complete(&registry(), "help st").1.is_empty());
    }

    #[test]
    fn builtins_and_commands_route_correctly() {
        let registry = registry();
        let notifier = Notifier::new(DEFAULT_LISTENER_STACK_SIZE);
        let dispatcher = Dispatcher::new(&registry, &notifier, true);
        let memory = Arc::new(MemorySink::default());
        let sink: Arc<dyn OutputSink> = memory.clone();

        assert_eq!(handle_line("devices", &registry, &dispatcher, &sink), Flow::Continue);
        assert_eq!(
            memory.at(Level::Print),
            vec!["stepper0", "stepper1", "x_axis"]
        );

        assert_eq!(handle_line("info ghost", &registry, &dispatcher, &sink), Flow::Continue);
        assert_eq!(memory.at(Level::Error), vec!["Stepper device ghost not found"]);

        assert_eq!(handle_line("quit", &registry, &dispatcher, &sink), Flow::Quit);
    }

    #[test]
    fn help_lists_every_command() {
        let memory = MemorySink::default();
        cmd_help(&memory);
        let text = memory
            .lines()
            .into_iter()
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n");
        for command in COMMANDS {
            assert!(text.contains(command.name), "{}", command.name);
        }
    }
}

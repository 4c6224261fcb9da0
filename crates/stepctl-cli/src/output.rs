//! Output sinks – where command results and completion reports are written.
//!
//! Commands never print directly.  They receive an [`OutputSink`] so the
//! same handler can write to the terminal, or to a buffer in tests.  The
//! completion listener keeps the sink it was started with for the rest of
//! the process.

use colored::Colorize;

/// Destination for human-readable command output.
pub trait OutputSink: Send + Sync {
    /// Plain result line.
    fn print(&self, line: &str);

    /// Non-fatal problem, e.g. one failed field of a status report.
    fn warn(&self, line: &str);

    /// Command failure.
    fn error(&self, line: &str);
}

/// Writes to stdout with colour-coded severities.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSink;

impl OutputSink for TerminalSink {
    fn print(&self, line: &str) {
        println!("{line}");
    }

    fn warn(&self, line: &str) {
        println!("{}", line.yellow());
    }

    fn error(&self, line: &str) {
        println!("{}", line.red());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::OutputSink;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Level {
        Print,
        Warn,
        Error,
    }

    /// Sink that records every line for later assertions.
    #[derive(Default)]
    pub(crate) struct MemorySink {
        lines: Mutex<Vec<(Level, String)>>,
    }

    impl MemorySink {
        pub(crate) fn lines(&self) -> Vec<(Level, String)> {
            self.lines.lock().clone()
        }

        pub(crate) fn at(&self, level: Level) -> Vec<String> {
            self.lines
                .lock()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, text)| text.clone())
                .collect()
        }

        /// Poll until `predicate` holds for the recorded lines or `timeout`
        /// elapses.  Returns whether the predicate was met.
        pub(crate) fn wait_until(
            &self,
            timeout: Duration,
            predicate: impl Fn(&[(Level, String)]) -> bool,
        ) -> bool {
            let deadline = Instant::now() + timeout;
            loop {
                if predicate(&self.lines.lock()) {
                    return true;
                }
                if Instant::now() >= deadline {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    impl OutputSink for MemorySink {
        fn print(&self, line: &str) {
            self.lines.lock().push((Level::Print, line.to_string()));
        }

        fn warn(&self, line: &str) {
            self.lines.lock().push((Level::Warn, line.to_string()));
        }

        fn error(&self, line: &str) {
            self.lines.lock().push((Level::Error, line.to_string()));
        }
    }
}

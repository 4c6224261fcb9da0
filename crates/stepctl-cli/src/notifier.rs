//! [`Notifier`] – the completion channel plus its background listener.
//!
//! Asynchronous motion commands share one [`CompletionChannel`].  The first
//! such command starts a single listener thread that blocks on the channel,
//! reports every completion to the output sink it was started with, and
//! loops for the rest of the process.  Later commands find the listener
//! already running and only arm the channel.
//!
//! The process-wide instance lives behind [`Notifier::global`]; tests build
//! their own with [`Notifier::new`].

use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use stepctl_hal::CompletionChannel;
use stepctl_types::{SignalResult, StepperError};
use tracing::{debug, error, info};

use crate::output::OutputSink;

/// Name of the listener thread.
pub const LISTENER_THREAD_NAME: &str = "stepper-listener";

/// Default listener stack size in bytes.
pub const DEFAULT_LISTENER_STACK_SIZE: usize = 64 * 1024;

static GLOBAL: OnceLock<Notifier> = OnceLock::new();

/// Owns the shared completion channel and the lazily started listener.
pub struct Notifier {
    channel: Arc<CompletionChannel>,
    listener: Mutex<Option<JoinHandle<()>>>,
    stack_size: usize,
}

impl Notifier {
    /// Create a notifier whose listener, once started, runs on a thread with
    /// `stack_size` bytes of stack.
    pub fn new(stack_size: usize) -> Self {
        Self {
            channel: Arc::new(CompletionChannel::new()),
            listener: Mutex::new(None),
            stack_size,
        }
    }

    /// The process-wide notifier.  The stack size of the first call wins.
    pub fn global(stack_size: usize) -> &'static Notifier {
        GLOBAL.get_or_init(|| Notifier::new(stack_size))
    }

    pub fn channel(&self) -> &Arc<CompletionChannel> {
        &self.channel
    }

    pub fn is_running(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Start the listener bound to `sink` unless it is already running.
    ///
    /// Returns `Ok(true)` when this call spawned the listener and `Ok(false)`
    /// when it was already running, in which case `sink` is dropped and the
    /// original sink stays bound.  Concurrent callers serialise on an
    /// internal lock, so at most one of them spawns.
    ///
    /// # Errors
    ///
    /// Returns [`StepperError::ListenerStartFailed`] if the thread cannot be
    /// created.  The notifier stays stopped and a later call may retry.
    pub fn ensure_started(&self, sink: Arc<dyn OutputSink>) -> Result<bool, StepperError> {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return Ok(false);
        }

        let channel = Arc::clone(&self.channel);
        let handle = thread::Builder::new()
            .name(LISTENER_THREAD_NAME.to_string())
            .stack_size(self.stack_size)
            .spawn(move || listen(&channel, sink.as_ref()))
            .map_err(|e| {
                error!(error = %e, "failed to spawn completion listener");
                StepperError::ListenerStartFailed(e.to_string())
            })?;

        info!(stack_size = self.stack_size, "completion listener started");
        *listener = Some(handle);
        Ok(true)
    }
}

fn listen(channel: &CompletionChannel, sink: &dyn OutputSink) {
    loop {
        let result = channel.observe_and_reset();
        debug!(%result, code = result.code(), "completion observed");
        report(sink, result);
    }
}

fn report(sink: &dyn OutputSink, result: SignalResult) {
    match result {
        SignalResult::StepsCompleted => sink.print("Stepper: All steps completed"),
        other => sink.warn(&format!("Stepper: motion ended: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testing::{Level, MemorySink};
    use std::time::Duration;
    use stepctl_hal::ChannelState;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn listener_is_not_started_until_requested() {
        let notifier = Notifier::new(DEFAULT_LISTENER_STACK_SIZE);
        assert!(!notifier.is_running());
        assert_eq!(notifier.channel().state(), ChannelState::Idle);
    }

    #[test]
    fn ensure_started_is_idempotent() {
        let notifier = Notifier::new(DEFAULT_LISTENER_STACK_SIZE);
        let sink: Arc<dyn OutputSink> = Arc::new(MemorySink::default());

        assert_eq!(notifier.ensure_started(Arc::clone(&sink)), Ok(true));
        assert_eq!(notifier.ensure_started(Arc::clone(&sink)), Ok(false));
        assert_eq!(notifier.ensure_started(sink), Ok(false));
        assert!(notifier.is_running());
    }

    #[test]
    fn concurrent_ensure_started_spawns_once() {
        let notifier = Arc::new(Notifier::new(DEFAULT_LISTENER_STACK_SIZE));
        let sinks: Vec<Arc<MemorySink>> = (0..8).map(|_| Arc::new(MemorySink::default())).collect();

        let workers: Vec<_> = sinks
            .iter()
            .map(|sink| {
                let notifier = Arc::clone(&notifier);
                let sink: Arc<dyn OutputSink> = sink.clone();
                thread::spawn(move || notifier.ensure_started(sink).unwrap())
            })
            .collect();
        let spawned = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|spawned| *spawned)
            .count();
        assert_eq!(spawned, 1);

        notifier.channel().arm();
        notifier.channel().signal(SignalResult::StepsCompleted);

        let delivered = |sinks: &[Arc<MemorySink>]| -> usize {
            sinks.iter().map(|s| s.lines().len()).sum()
        };
        let deadline = std::time::Instant::now() + WAIT;
        while delivered(&sinks) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(delivered(&sinks), 1);
    }

    #[test]
    fn listener_reports_to_first_sink_and_resets_channel() {
        let notifier = Notifier::new(DEFAULT_LISTENER_STACK_SIZE);
        let first = Arc::new(MemorySink::default());
        let second = Arc::new(MemorySink::default());
        notifier.ensure_started(first.clone()).unwrap();
        notifier.ensure_started(second.clone()).unwrap();

        notifier.channel().arm();
        notifier.channel().signal(SignalResult::StepsCompleted);

        assert!(first.wait_until(WAIT, |lines| lines.len() == 1));
        assert_eq!(first.at(Level::Print), vec!["Stepper: All steps completed"]);
        assert!(second.lines().is_empty());

        // The channel is reusable after the report.
        assert!(first.wait_until(WAIT, |_| notifier.channel().state() == ChannelState::Idle));
        notifier.channel().arm();
        notifier.channel().signal(SignalResult::StallDetected);
        assert!(first.wait_until(WAIT, |lines| lines.len() == 2));
        assert_eq!(first.at(Level::Warn), vec!["Stepper: motion ended: stall detected"]);
    }
}

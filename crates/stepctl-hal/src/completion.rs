//! [`CompletionChannel`] – the shared "motion finished" notification slot.
//!
//! A channel moves through three states:
//!
//! | State | Entered by |
//! |---|---|
//! | [`ChannelState::Idle`] | construction, or the reader after observing a signal |
//! | [`ChannelState::Armed`] | an issuing command, right before a motion request |
//! | [`ChannelState::Signaled`] | a driver, when the motion ends |
//!
//! There is one slot, not a queue.  Arming an already armed channel drops the
//! association with the earlier request, and a second signal before the reader
//! wakes replaces the stored result, so the reader sees exactly one
//! notification carrying the most recent result.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use stepctl_types::SignalResult;
use tracing::{debug, warn};

/// Observable state of a [`CompletionChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Armed,
    Signaled,
}

#[derive(Debug)]
enum Slot {
    Idle,
    Armed,
    Signaled(SignalResult),
}

/// Single-slot, reusable completion notification shared between command
/// issuers, drivers and one reader.
#[derive(Debug)]
pub struct CompletionChannel {
    slot: Mutex<Slot>,
    signaled: Condvar,
}

impl Default for CompletionChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionChannel {
    /// Create an idle channel.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
            signaled: Condvar::new(),
        }
    }

    /// Prepare the channel for the next completion and return the state it
    /// was in.
    ///
    /// From `Idle` this moves to `Armed`.  From `Armed` it stays `Armed` and
    /// the earlier request silently loses its notification.  A `Signaled`
    /// channel is left alone so the pending result still reaches the reader.
    pub fn arm(&self) -> ChannelState {
        let mut slot = self.slot.lock();
        match *slot {
            Slot::Idle => {
                *slot = Slot::Armed;
                debug!("completion channel armed");
                ChannelState::Idle
            }
            Slot::Armed => {
                warn!("completion channel re-armed before the pending motion completed");
                ChannelState::Armed
            }
            Slot::Signaled(result) => {
                debug!(%result, "arm requested while a signal is still unobserved");
                ChannelState::Signaled
            }
        }
    }

    /// Post `result` and wake the reader.  Callable from any thread.
    pub fn signal(&self, result: SignalResult) {
        let mut slot = self.slot.lock();
        match *slot {
            Slot::Armed => debug!(%result, "completion channel signaled"),
            Slot::Idle => debug!(%result, "signal on an idle completion channel"),
            Slot::Signaled(previous) => {
                debug!(%previous, %result, "unobserved signal overwritten")
            }
        }
        *slot = Slot::Signaled(result);
        self.signaled.notify_all();
    }

    /// Block until the channel is signaled, then return the result and move
    /// back to `Idle` in the same critical section.
    pub fn observe_and_reset(&self) -> SignalResult {
        let mut slot = self.slot.lock();
        loop {
            if let Slot::Signaled(result) = *slot {
                *slot = Slot::Idle;
                return result;
            }
            self.signaled.wait(&mut slot);
        }
    }

    /// Like [`observe_and_reset`][Self::observe_and_reset] but gives up after
    /// `timeout`, returning `None` and leaving the state untouched.  A timeout
    /// too large to express as a deadline waits without limit.
    pub fn observe_and_reset_timeout(&self, timeout: Duration) -> Option<SignalResult> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.observe_and_reset());
        };
        let mut slot = self.slot.lock();
        loop {
            if let Slot::Signaled(result) = *slot {
                *slot = Slot::Idle;
                return Some(result);
            }
            if self.signaled.wait_until(&mut slot, deadline).timed_out() {
                return match *slot {
                    Slot::Signaled(result) => {
                        *slot = Slot::Idle;
                        Some(result)
                    }
                    _ => None,
                };
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        match *self.slot.lock() {
            Slot::Idle => ChannelState::Idle,
            Slot::Armed => ChannelState::Armed,
            Slot::Signaled(_) => ChannelState::Signaled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn new_channel_is_idle() {
        let channel = CompletionChannel::new();
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn arm_signal_observe_cycle() {
        let channel = CompletionChannel::new();
        assert_eq!(channel.arm(), ChannelState::Idle);
        assert_eq!(channel.state(), ChannelState::Armed);

        channel.signal(SignalResult::StepsCompleted);
        assert_eq!(channel.state(), ChannelState::Signaled);

        assert_eq!(channel.observe_and_reset(), SignalResult::StepsCompleted);
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn rearming_an_armed_channel_keeps_it_armed() {
        let channel = CompletionChannel::new();
        channel.arm();
        assert_eq!(channel.arm(), ChannelState::Armed);
        assert_eq!(channel.state(), ChannelState::Armed);
    }

    #[test]
    fn arm_does_not_swallow_unobserved_signal() {
        let channel = CompletionChannel::new();
        channel.arm();
        channel.signal(SignalResult::StallDetected);
        assert_eq!(channel.arm(), ChannelState::Signaled);
        assert_eq!(channel.state(), ChannelState::Signaled);
        assert_eq!(channel.observe_and_reset(), SignalResult::StallDetected);
    }

    #[test]
    fn second_signal_overwrites_result() {
        let channel = CompletionChannel::new();
        channel.arm();
        channel.signal(SignalResult::Stopped);
        channel.signal(SignalResult::StepsCompleted);

        assert_eq!(
            channel.observe_and_reset_timeout(Duration::from_millis(10)),
            Some(SignalResult::StepsCompleted)
        );
        // Only one notification was delivered.
        assert_eq!(channel.observe_and_reset_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn observe_times_out_when_never_signaled() {
        let channel = CompletionChannel::new();
        channel.arm();
        assert_eq!(channel.observe_and_reset_timeout(Duration::from_millis(20)), None);
        assert_eq!(channel.state(), ChannelState::Armed);
    }

    #[test]
    fn unbounded_timeout_returns_pending_signal() {
        let channel = CompletionChannel::new();
        channel.arm();
        channel.signal(SignalResult::StepsCompleted);
        assert_eq!(
            channel.observe_and_reset_timeout(Duration::MAX),
            Some(SignalResult::StepsCompleted)
        );
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn unbounded_timeout_waits_for_late_signal() {
        let channel = Arc::new(CompletionChannel::new());
        channel.arm();

        let driver = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                channel.signal(SignalResult::Stopped);
            })
        };

        assert_eq!(
            channel.observe_and_reset_timeout(Duration::MAX),
            Some(SignalResult::Stopped)
        );
        driver.join().unwrap();
    }

    #[test]
    fn signal_from_another_thread_wakes_reader() {
        let channel = Arc::new(CompletionChannel::new());
        channel.arm();

        let driver = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                channel.signal(SignalResult::StepsCompleted);
            })
        };

        assert_eq!(channel.observe_and_reset(), SignalResult::StepsCompleted);
        driver.join().unwrap();
        assert_eq!(channel.state(), ChannelState::Idle);
    }
}

//! Timer bookkeeping for live attempts. The coordinator owns the task
//! handles; the quiz engine spawns the tasks and decides what they do.
//!
//! Per attempt there are at most three scheduled units of work: the
//! countdown display updater, the question-timeout auto-advance, and
//! the session-inactivity watchdog. Cancellation is idempotent:
//! aborting a task that already finished, or cancelling an attempt
//! with no timers, is a no-op.

use crate::transport::MessageRef;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::{self, JoinHandle};

#[derive(Default)]
struct AttemptTimers {
    countdown: Option<JoinHandle<()>>,
    timeout: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
    pinned: Option<MessageRef>,
}

impl AttemptTimers {
    /// Takes both question handles, aborting all but the task this is
    /// running on. The timeout task cancels its pair on the way into
    /// the engine; aborting its own handle there would kill the blank
    /// answer mid-write.
    fn cancel_question(&mut self) {
        let current = task::try_id();
        if let Some(handle) = self.countdown.take() {
            if current != Some(handle.id()) {
                handle.abort();
            }
        }
        if let Some(handle) = self.timeout.take() {
            if current != Some(handle.id()) {
                handle.abort();
            }
        }
    }
}

#[derive(Default)]
pub struct TimerCoordinator {
    tasks: Mutex<HashMap<i64, AttemptTimers>>,
}

impl TimerCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the countdown and timeout tasks for the attempt's
    /// current question, cancelling any previously scheduled pair
    /// first (double-schedule protection).
    pub fn set_question_timers(
        &self,
        attempt_id: i64,
        countdown: JoinHandle<()>,
        timeout: JoinHandle<()>,
    ) {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.entry(attempt_id).or_default();
        entry.cancel_question();
        entry.countdown = Some(countdown);
        entry.timeout = Some(timeout);
    }

    /// Cancels the per-question timers without touching the watchdog.
    pub fn cancel_question_timers(&self, attempt_id: i64) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(entry) = tasks.get_mut(&attempt_id) {
            entry.cancel_question();
        }
    }

    pub fn set_watchdog(&self, attempt_id: i64, watchdog: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.entry(attempt_id).or_default();
        if let Some(old) = entry.watchdog.replace(watchdog) {
            old.abort();
        }
    }

    /// Records the currently pinned question message, returning the
    /// previous one so the caller can unpin it.
    pub fn set_pinned(&self, attempt_id: i64, pinned: MessageRef) -> Option<MessageRef> {
        let mut tasks = self.tasks.lock().unwrap();
        let entry = tasks.entry(attempt_id).or_default();
        entry.pinned.replace(pinned)
    }

    /// Terminal cleanup: aborts everything scheduled for the attempt
    /// and forgets it. Returns the pinned message, if any, for unpin.
    pub fn clear(&self, attempt_id: i64) -> Option<MessageRef> {
        self.clear_inner(attempt_id, true)
    }

    /// Cleanup variant for the watchdog's own expiry path: the running
    /// watchdog task must not abort itself mid-cleanup.
    pub fn clear_expired(&self, attempt_id: i64) -> Option<MessageRef> {
        self.clear_inner(attempt_id, false)
    }

    fn clear_inner(&self, attempt_id: i64, abort_watchdog: bool) -> Option<MessageRef> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut entry = tasks.remove(&attempt_id)?;
        entry.cancel_question();
        if let Some(watchdog) = entry.watchdog.take() {
            if abort_watchdog {
                watchdog.abort();
            }
        }
        entry.pinned
    }

    pub fn is_tracking(&self, attempt_id: i64) -> bool {
        let tasks = self.tasks.lock().unwrap();
        tasks.contains_key(&attempt_id)
    }
}

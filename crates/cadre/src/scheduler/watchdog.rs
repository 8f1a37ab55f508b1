//! Per-task max-duration timers.
//!
//! A timer is a Tokio task that sleeps for the configured duration and then
//! runs a callback. Timers are keyed by task id and tagged with the
//! admission epoch they were armed for, so disarming a finished admission
//! never touches the timer of a later re-admission. All timers are aborted
//! when the watchdog is dropped.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::task::TaskId;

struct Timer {
    epoch: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct Watchdog {
    timers: Mutex<HashMap<TaskId, Timer>>,
}

impl Watchdog {
    /// Spawn a timer that calls `on_fire` after `timeout`. Returns `false`
    /// (and arms nothing) when called outside a Tokio runtime, or when a
    /// timer from a later epoch is already armed for the task.
    pub fn arm<F>(&self, task_id: &TaskId, epoch: u64, timeout: Duration, on_fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(%task_id, "No async runtime; task watchdog not armed");
            return false;
        };
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        let newer = timers.get(task_id).map(|t| t.epoch).filter(|&e| e > epoch);
        if let Some(current) = newer {
            debug!(%task_id, epoch, current, "Stale watchdog arm ignored");
            return false;
        }
        let handle = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            on_fire();
        });
        if let Some(previous) = timers.insert(task_id.clone(), Timer { epoch, handle }) {
            previous.handle.abort();
        }
        true
    }

    /// Abort the timer armed for this admission, if any.
    pub fn disarm(&self, task_id: &TaskId, epoch: u64) {
        if let Some(timer) = self.take(task_id, epoch) {
            timer.handle.abort();
        }
    }

    /// Forget a timer that has fired, without aborting the running callback.
    pub fn clear_fired(&self, task_id: &TaskId, epoch: u64) {
        self.take(task_id, epoch);
    }

    pub fn armed_count(&self) -> usize {
        self.timers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn take(&self, task_id: &TaskId, epoch: u64) -> Option<Timer> {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        match timers.get(task_id) {
            Some(timer) if timer.epoch == epoch => timers.remove(task_id),
            _ => None,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}

//! Concurrency-aware task scheduler.
//!
//! [`TaskScheduler`] is the single owner of the running and queued sets.
//! Every mutation goes through one mutex; the lock is never held while
//! calling out to the [`TaskRunner`], the event handler or the watchdog, so
//! callbacks may re-enter the scheduler.
//!
//! Admission rules:
//!
//! - a task with a parent (a sub-agent) is admitted unconditionally, so a
//!   parent that holds a slot and waits on its children can never deadlock;
//! - a main task is admitted iff fewer than `max_concurrent` tasks are
//!   running, otherwise it joins the tail of a FIFO queue;
//! - whenever a slot frees up, queued main tasks are promoted in order and
//!   handed to [`TaskRunner::start_task`].
//!
//! Each admitted task gets a watchdog timer (30 minutes by default) that
//! force-finishes it if it never reports completion.
//!
//! ```ignore
//! let scheduler = TaskScheduler::new(SchedulerSettings::default(), runner);
//! match scheduler.enqueue(&task) {
//!     Admission::StartImmediately => executor.start(task),
//!     Admission::Queue => task.status = TaskStatus::Queued,
//! }
//! // later, from the task's completion callback:
//! scheduler.on_task_finished(&task.id);
//! ```

mod queue;
mod watchdog;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

pub use queue::{Admission, QueueStatus, SlotKind};

use self::queue::{Cancelled, EnqueueEffect, QueueState, Released, Started};
use self::watchdog::Watchdog;
use crate::config::SchedulerSettings;
use crate::events::{EventHandler, NoopHandler, SchedulerEvent};
use crate::task::{Task, TaskId};

/// Host collaborator that actually runs tasks.
pub trait TaskRunner: Send + Sync {
    /// A queued task was promoted into a free slot and should start now.
    fn start_task(&self, task_id: &TaskId);

    /// The watchdog force-finished a task. The host should stop it and mark
    /// it timed out.
    fn task_timed_out(&self, task_id: &TaskId) {
        let _ = task_id;
    }
}

struct Inner {
    state: Mutex<QueueState>,
    timeout: Mutex<Option<Duration>>,
    runner: Arc<dyn TaskRunner>,
    events: Arc<dyn EventHandler>,
    watchdog: Watchdog,
}

/// Admission queue shared by task creation, completion and sub-agent spawn
/// paths. Cheap to clone.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    pub fn new(settings: SchedulerSettings, runner: Arc<dyn TaskRunner>) -> Self {
        Self::with_events(settings, runner, Arc::new(NoopHandler))
    }

    pub fn with_events(
        settings: SchedulerSettings,
        runner: Arc<dyn TaskRunner>,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::new(settings.max_concurrent())),
                timeout: Mutex::new(settings.task_timeout()),
                runner,
                events,
                watchdog: Watchdog::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timeout(&self) -> Option<Duration> {
        *self.inner.timeout.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit or queue a task. Enqueuing a task that is already running or
    /// queued returns its current admission and changes nothing.
    pub fn enqueue(&self, task: &Task) -> Admission {
        let kind = if task.is_sub_agent() {
            SlotKind::SubAgent
        } else {
            SlotKind::Main
        };
        let (admission, effect) = self.state().enqueue(&task.id, kind);

        match effect {
            EnqueueEffect::Admitted {
                epoch,
                running_count,
            } => {
                self.arm_watchdog(&task.id, epoch);
                self.inner.events.on_event(&SchedulerEvent::Admitted {
                    task_id: &task.id,
                    sub_agent: kind == SlotKind::SubAgent,
                    running_count,
                });
            }
            EnqueueEffect::Queued { position } => {
                self.inner.events.on_event(&SchedulerEvent::Queued {
                    task_id: &task.id,
                    position,
                });
            }
            EnqueueEffect::Unchanged => {
                debug!(task_id = %task.id, ?admission, "Task already scheduled");
            }
        }
        admission
    }

    /// Release a finished task's slot and start the next queued tasks.
    /// Unknown ids are ignored.
    pub fn on_task_finished(&self, task_id: &TaskId) {
        let released = self.state().finish(task_id);
        let Some(released) = released else {
            debug!(%task_id, "Finish reported for a task that is not running");
            return;
        };
        self.inner.watchdog.disarm(task_id, released.epoch);
        self.inner
            .events
            .on_event(&SchedulerEvent::Finished { task_id });
        self.start_promoted(released.promoted);
    }

    /// Remove a task from whichever set holds it. Returns `false` if the
    /// scheduler did not know the task.
    ///
    /// Cancelling a queued task has no other effect. Cancelling a running
    /// task frees its slot and may promote the next queued task.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let cancelled = self.state().cancel(task_id);
        match cancelled {
            Cancelled::Queued => {
                self.inner.events.on_event(&SchedulerEvent::Cancelled {
                    task_id,
                    was_running: false,
                });
                true
            }
            Cancelled::Running(Released { epoch, promoted }) => {
                self.inner.watchdog.disarm(task_id, epoch);
                self.inner.events.on_event(&SchedulerEvent::Cancelled {
                    task_id,
                    was_running: true,
                });
                self.start_promoted(promoted);
                true
            }
            Cancelled::Unknown => false,
        }
    }

    /// Snapshot of the running and queued sets.
    pub fn status(&self) -> QueueStatus {
        self.state().status()
    }

    pub fn is_running(&self, task_id: &TaskId) -> bool {
        self.state().is_running(task_id)
    }

    pub fn is_queued(&self, task_id: &TaskId) -> bool {
        self.state().is_queued(task_id)
    }

    pub fn max_concurrent(&self) -> usize {
        self.state().max_concurrent()
    }

    /// Apply new settings. A higher limit promotes queued tasks right away; a
    /// lower one lets running tasks drain. The new timeout applies to
    /// admissions from now on.
    pub fn apply_settings(&self, settings: &SchedulerSettings) {
        *self.inner.timeout.lock().unwrap_or_else(|e| e.into_inner()) = settings.task_timeout();
        let promoted = self.state().set_max_concurrent(settings.max_concurrent());
        info!(
            max_concurrent = settings.max_concurrent(),
            timeout_minutes = settings.task_timeout_minutes,
            "Scheduler settings applied"
        );
        self.start_promoted(promoted);
    }

    /// Number of armed watchdog timers.
    pub fn armed_watchdogs(&self) -> usize {
        self.inner.watchdog.armed_count()
    }

    fn start_promoted(&self, promoted: Vec<Started>) {
        for Started { task_id, epoch } in promoted {
            self.arm_watchdog(&task_id, epoch);
            self.inner
                .events
                .on_event(&SchedulerEvent::Promoted { task_id: &task_id });
            self.inner.runner.start_task(&task_id);
        }
    }

    fn arm_watchdog(&self, task_id: &TaskId, epoch: u64) {
        let Some(timeout) = self.timeout() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let id = task_id.clone();
        self.inner.watchdog.arm(task_id, epoch, timeout, move || {
            if let Some(inner) = weak.upgrade() {
                TaskScheduler { inner }.on_watchdog_fired(&id, epoch);
            }
        });
    }

    fn on_watchdog_fired(&self, task_id: &TaskId, epoch: u64) {
        self.inner.watchdog.clear_fired(task_id, epoch);
        let released = self.state().finish_epoch(task_id, epoch);
        let Some(released) = released else {
            return;
        };
        self.inner
            .events
            .on_event(&SchedulerEvent::TimedOut { task_id });
        self.inner.runner.task_timed_out(task_id);
        self.start_promoted(released.promoted);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Runner that records which tasks it was asked to start or stop.
    #[derive(Default)]
    pub struct RecordingRunner {
        pub started: Mutex<Vec<TaskId>>,
        pub timed_out: Mutex<Vec<TaskId>>,
    }

    impl RecordingRunner {
        pub fn started(&self) -> Vec<String> {
            self.started
                .lock()
                .unwrap()
                .iter()
                .map(|id| id.to_string())
                .collect()
        }

        pub fn timed_out(&self) -> Vec<String> {
            self.timed_out
                .lock()
                .unwrap()
                .iter()
                .map(|id| id.to_string())
                .collect()
        }
    }

    impl TaskRunner for RecordingRunner {
        fn start_task(&self, task_id: &TaskId) {
            self.started.lock().unwrap().push(task_id.clone());
        }

        fn task_timed_out(&self, task_id: &TaskId) {
            self.timed_out.lock().unwrap().push(task_id.clone());
        }
    }
}

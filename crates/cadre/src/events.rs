//! Scheduler lifecycle events and handlers.
//!
//! The [`TaskScheduler`](crate::scheduler::TaskScheduler) reports every
//! admission decision and slot change through [`SchedulerEvent`] variants.
//! Events are emitted after the scheduler's state lock is released, so a
//! handler may call back into the scheduler (e.g. `status()`).
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or hosts that only need the runner callbacks |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use tracing::{debug, info, warn};

use crate::task::TaskId;

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent<'a> {
    /// A task took a slot on submission (or bypassed the limit as a
    /// sub-agent).
    Admitted {
        task_id: &'a TaskId,
        sub_agent: bool,
        running_count: usize,
    },
    /// A main task was placed at the tail of the queue.
    Queued {
        task_id: &'a TaskId,
        /// Zero-based position in the queue.
        position: usize,
    },
    /// A queued task was moved into a freed slot.
    Promoted { task_id: &'a TaskId },
    /// A running task finished normally.
    Finished { task_id: &'a TaskId },
    /// A task was cancelled. `was_running` is false for queued tasks.
    Cancelled { task_id: &'a TaskId, was_running: bool },
    /// The watchdog force-finished a task.
    TimedOut { task_id: &'a TaskId },
}

impl SchedulerEvent<'_> {
    /// The task the event is about.
    pub fn task_id(&self) -> &TaskId {
        match self {
            SchedulerEvent::Admitted { task_id, .. }
            | SchedulerEvent::Queued { task_id, .. }
            | SchedulerEvent::Promoted { task_id }
            | SchedulerEvent::Finished { task_id }
            | SchedulerEvent::Cancelled { task_id, .. }
            | SchedulerEvent::TimedOut { task_id } => task_id,
        }
    }
}

/// Handler for scheduler events.
///
/// The default implementation ignores every event.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &SchedulerEvent<'_>) {
        let _ = event;
    }
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let SchedulerEvent::Promoted { task_id } = event {
///         println!("{task_id} started");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&SchedulerEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&SchedulerEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&SchedulerEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &SchedulerEvent<'_>) {
        (self.0)(event)
    }
}

/// An event handler that delegates to multiple inner handlers in
/// registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(verbose, my_metrics_handler);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &SchedulerEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs every scheduler event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &SchedulerEvent<'_>) {
        match event {
            SchedulerEvent::Admitted {
                task_id,
                sub_agent,
                running_count,
            } => {
                if *sub_agent {
                    info!(%task_id, running_count, "Sub-agent admitted (limit bypassed)");
                } else {
                    info!(%task_id, running_count, "Task admitted");
                }
            }
            SchedulerEvent::Queued { task_id, position } => {
                info!(%task_id, position, "Task queued");
            }
            SchedulerEvent::Promoted { task_id } => {
                info!(%task_id, "Queued task promoted");
            }
            SchedulerEvent::Finished { task_id } => {
                debug!(%task_id, "Task finished");
            }
            SchedulerEvent::Cancelled {
                task_id,
                was_running,
            } => {
                info!(%task_id, was_running, "Task cancelled");
            }
            SchedulerEvent::TimedOut { task_id } => {
                warn!(%task_id, "Task exceeded its time limit and was force-finished");
            }
        }
    }
}

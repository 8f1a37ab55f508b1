//! Convenience re-exports for common `cadre` types.
//!
//! Meant to be glob-imported by hosts:
//!
//! ```ignore
//! use cadre::prelude::*;
//! ```
//!
//! This pulls in what a task executor needs day to day: task and workspace
//! types, the gate, scheduler and compactor, prompts, and the event
//! handlers. Guard rules, signal heuristics and the tracing layer are
//! left out; import those from their modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::task::{
    GateFlags, Task, TaskId, TaskStatus, Workspace, WorkspaceId, WorkspacePermissions,
};
pub use crate::{Message, MessageRole};

// ── Preflight ───────────────────────────────────────────────────────
pub use crate::gate::{
    GateVerdict, PauseReason, PauseSink, PreflightGate, WorkspaceClassifier, WorkspaceNeed,
};
pub use crate::prompt::{PausePrompt, PromptBoard, PromptChoice, Resolution};
pub use crate::switcher::{Daemon, SwitchReason, ToolRegistry, WorkspaceAutoSwitcher};

// ── Scheduling ──────────────────────────────────────────────────────
pub use crate::config::SchedulerSettings;
pub use crate::events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    SchedulerEvent,
};
pub use crate::scheduler::{Admission, QueueStatus, TaskRunner, TaskScheduler};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{
    CompactionKind, CompactionResult, CompactorConfig, ContextCompactor, TokenEstimator,
};

// ── Facade ──────────────────────────────────────────────────────────
pub use crate::orchestrator::{Orchestrator, ToolDispatch};

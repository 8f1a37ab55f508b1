//! Agent task orchestration core for hosts that run many autonomous agent
//! tasks at once.
//!
//! `cadre` owns the three pieces of a multi-agent runtime that must stay
//! correct under concurrent mutation:
//!
//! - a **preflight gate** that decides, before any tool or shell action,
//!   whether a task has to pause for human acknowledgement;
//! - a **task scheduler** that admits or queues tasks against a concurrency
//!   limit without ever deadlocking a parent task against the sub-agents it
//!   spawned;
//! - a **context compactor** that keeps a conversation under the model's
//!   token budget while guaranteeing the first message and every pinned
//!   memory-recall block survive.
//!
//! Everything that talks to the outside world (LLM providers, persistence,
//! UI) is an in-process trait the host implements. Heuristic defaults are
//! provided so the crate is usable on its own.
//!
//! # Getting started
//!
//! ```ignore
//! use cadre::prelude::*;
//!
//! let scheduler = TaskScheduler::new(SchedulerSettings::default(), runner);
//! let task = Task::new(TaskId::new("t-1")?, "ws-1", "Fix the failing test in src/lib.rs");
//!
//! match scheduler.enqueue(&task) {
//!     Admission::StartImmediately => spawn_task(task),
//!     Admission::Queue => { /* the runner is told to start it later */ }
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Gate a tool call:** [`PreflightGate`](gate::PreflightGate) with its
//!   ordered guard lists in [`gate::rules`]. Pauses go to a
//!   [`PauseSink`](gate::PauseSink); [`PromptBoard`](prompt::PromptBoard) is
//!   the in-process implementation.
//!
//! - **Resolve an ambiguous task's workspace:**
//!   [`WorkspaceAutoSwitcher`](switcher::WorkspaceAutoSwitcher). The switch
//!   is planned first and applied all-or-nothing.
//!
//! - **Admit, queue, finish and cancel tasks:**
//!   [`TaskScheduler`](scheduler::TaskScheduler). Sub-agents (tasks with a
//!   parent) bypass the limit; main tasks queue FIFO behind it.
//!
//! - **Fit a conversation into the context window:**
//!   [`ContextCompactor`](context::ContextCompactor).
//!
//! - **Wire it all together:** [`Orchestrator`](orchestrator::Orchestrator).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`task`] | Task, workspace and identifier types |
//! | [`gate`] | Preflight gate, guard rules, intent and need heuristics |
//! | [`signals`] | Workspace signal lookup (project markers, code files, app dirs) |
//! | [`switcher`] | Atomic workspace auto-switch for ambiguous tasks |
//! | [`prompt`] | Pending pause prompts and user acknowledgement |
//! | [`scheduler`] | Admission queue, promotion and per-task watchdog |
//! | [`context`] | Token estimation, model context windows, compaction |
//! | [`events`] | Scheduler lifecycle events and handlers |
//! | [`config`] | Scheduler settings |
//! | [`telemetry`] | Tracing layer that captures an activity log |

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gate;
pub mod orchestrator;
pub mod prelude;
pub mod prompt;
pub mod scheduler;
pub mod signals;
pub mod switcher;
pub mod task;
pub mod telemetry;

use serde::{Deserialize, Serialize};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Tool, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let assist = Message::assistant("reply");
        assert_eq!(assist.role, MessageRole::Assistant);

        let tool = Message::tool("result");
        assert_eq!(tool.role, MessageRole::Tool);
    }

    #[test]
    fn message_role_serializes_lowercase() {
        let json = serde_json::to_value(Message::assistant("x")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "x");

        let back: Message = serde_json::from_str(r#"{"role":"tool","content":"ok"}"#).unwrap();
        assert_eq!(back.role, MessageRole::Tool);
        assert_eq!(MessageRole::Tool.to_string(), "tool");
    }
}

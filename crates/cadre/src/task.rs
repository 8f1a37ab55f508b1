//! Task, workspace and identifier types.
//!
//! A [`Task`] is owned by the host's executor. The scheduler reads its id and
//! parent link; the gate reads its [`GateFlags`]; the auto-switcher rewrites
//! its `workspace_id`. A [`Workspace`] is treated as an immutable snapshot
//! for the duration of a check and is replaced wholesale on a switch.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdError;

// ── Identifiers ────────────────────────────────────────────────────

/// Identifier of a task. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Validate and wrap a task id. Empty ids are a caller contract
    /// violation and are rejected here rather than deep in the scheduler.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(IdError::Empty);
        }
        if id.chars().any(char::is_whitespace) {
            return Err(IdError::Whitespace(id));
        }
        Ok(Self(id))
    }

    /// A fresh random id (`task-<uuid>`).
    pub fn generate() -> Self {
        Self(format!("task-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Identifier of a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ── Task ───────────────────────────────────────────────────────────

/// Lifecycle status of a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Queued,
    Running,
    /// Halted by the preflight gate until the user responds.
    Paused,
    Completed,
    Failed,
    Cancelled,
    /// Force-finished by the scheduler's watchdog.
    TimedOut,
}

impl TaskStatus {
    /// Whether the task can no longer make progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::TimedOut
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Per-task flags consulted by the preflight gate.
///
/// Acknowledgement flags are only ever set by the user's response to a pause
/// prompt (see [`PromptBoard::apply_choice`](crate::prompt::PromptBoard::apply_choice)).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateFlags {
    /// The user already answered a workspace prompt for this task.
    #[serde(alias = "workspacePreflightAcknowledged")]
    pub workspace_preflight_acknowledged: bool,
    /// The task is explicitly broadening its own permissions.
    #[serde(alias = "capabilityUpgradeRequested")]
    pub capability_upgrade_requested: bool,
    /// The next tool call runs a shell / execution tool.
    #[serde(alias = "requiresExecutionToolRun")]
    pub requires_execution_tool_run: bool,
    /// The user opted to continue this task without shell access.
    #[serde(alias = "allowExecutionWithoutShell")]
    pub allow_execution_without_shell: bool,
}

/// A unit of agent work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Present for sub-agents: the task that spawned this one.
    #[serde(default, alias = "parentTaskId")]
    pub parent_task_id: Option<TaskId>,
    #[serde(alias = "workspaceId")]
    pub workspace_id: WorkspaceId,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub flags: GateFlags,
}

impl Task {
    pub fn new(
        id: TaskId,
        workspace_id: impl Into<WorkspaceId>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_task_id: None,
            workspace_id: workspace_id.into(),
            status: TaskStatus::Pending,
            title: String::new(),
            prompt: prompt.into(),
            flags: GateFlags::default(),
        }
    }

    /// Mark this task as a sub-agent of `parent`.
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_task_id = Some(parent);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_flags(mut self, flags: GateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sub-agents bypass the scheduler's concurrency limit.
    pub fn is_sub_agent(&self) -> bool {
        self.parent_task_id.is_some()
    }

    /// Title and prompt joined, lowercased, for keyword heuristics.
    pub fn intent_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.prompt.len() + 1);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.prompt);
        text.to_lowercase()
    }
}

// ── Workspace ──────────────────────────────────────────────────────

/// Capabilities granted to tools running inside a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspacePermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub network: bool,
    pub shell: bool,
}

impl Default for WorkspacePermissions {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            delete: false,
            network: false,
            shell: false,
        }
    }
}

/// A directory the agent's tools are bound to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
    /// Scratch workspace created for a task without a chosen project.
    #[serde(default, alias = "isTemp")]
    pub is_temp: bool,
    #[serde(default)]
    pub permissions: WorkspacePermissions,
    #[serde(default, alias = "lastUsedAt")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Workspace {
    /// A non-temporary project workspace.
    pub fn project(id: impl Into<WorkspaceId>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: id.into(),
            name,
            path,
            is_temp: false,
            permissions: WorkspacePermissions::default(),
            last_used_at: None,
        }
    }

    /// A scratch workspace.
    pub fn temp(id: impl Into<WorkspaceId>, path: impl Into<PathBuf>) -> Self {
        Self {
            is_temp: true,
            ..Self::project(id, path)
        }
    }

    pub fn with_shell(mut self, shell: bool) -> Self {
        self.permissions.shell = shell;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_rejects_empty_and_whitespace() {
        assert_eq!(TaskId::new(""), Err(IdError::Empty));
        assert_eq!(TaskId::new("   "), Err(IdError::Empty));
        assert!(matches!(TaskId::new("a b"), Err(IdError::Whitespace(_))));
        assert_eq!(TaskId::new("t-1").unwrap().as_str(), "t-1");
    }

    #[test]
    fn task_id_deserialize_validates() {
        let ok: TaskId = serde_json::from_str(r#""t-9""#).unwrap();
        assert_eq!(ok.to_string(), "t-9");
        assert!(serde_json::from_str::<TaskId>(r#""""#).is_err());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = TaskId::generate();
        let b = TaskId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("task-"));
    }

    #[test]
    fn task_deserializes_camel_case_host_records() {
        let json = r#"{
            "id": "child",
            "parentTaskId": "parent",
            "workspaceId": "ws-1",
            "prompt": "run the tests",
            "flags": { "requiresExecutionToolRun": true }
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert!(task.is_sub_agent());
        assert_eq!(task.workspace_id.as_str(), "ws-1");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.flags.requires_execution_tool_run);
        assert!(!task.flags.allow_execution_without_shell);
    }

    #[test]
    fn task_without_id_is_rejected() {
        let json = r#"{ "id": "", "workspaceId": "ws-1" }"#;
        assert!(serde_json::from_str::<Task>(json).is_err());
    }

    #[test]
    fn intent_text_joins_title_and_prompt() {
        let task = Task::new(TaskId::new("t").unwrap(), "ws", "Fix The Build").with_title("CI");
        assert_eq!(task.intent_text(), "ci\nfix the build");
    }

    #[test]
    fn workspace_constructors() {
        let ws = Workspace::temp("tmp", "/tmp/scratch-1");
        assert!(ws.is_temp);
        assert_eq!(ws.name, "scratch-1");
        assert!(!ws.permissions.shell);

        let ws = Workspace::project("p", "/home/me/app").with_shell(true);
        assert!(!ws.is_temp);
        assert!(ws.permissions.shell);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::TimedOut.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
        assert_eq!(TaskStatus::TimedOut.to_string(), "timed_out");
    }
}

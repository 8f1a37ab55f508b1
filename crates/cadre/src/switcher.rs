//! Automatic workspace switch for ambiguous tasks stuck in a temp workspace.
//!
//! A switch touches five pieces of state: the in-memory workspace, the
//! task's `workspace_id`, the tool registry binding, the daemon's persisted
//! task record and the daemon's audit log. The switch is planned first
//! (candidate lookup, signal check, new state resolved) and then applied as
//! one command:
//!
//! 1. bind the tool registry to the new workspace;
//! 2. persist the task's new workspace (on failure, rebind the registry);
//! 3. record the audit event (on failure, undo 2 and 1);
//! 4. commit the in-memory task and workspace.
//!
//! Step 4 cannot fail, so either all five effects happen or none do.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::{CollaboratorError, SwitchError};
use crate::signals::SignalProvider;
use crate::task::{Task, TaskId, Workspace, WorkspaceId};

// ── Collaborators ──────────────────────────────────────────────────

/// Persistence and audit collaborator.
pub trait Daemon: Send + Sync {
    /// The most recently used workspace that is not a temp workspace.
    fn most_recent_non_temp_workspace(&self) -> Option<Workspace>;

    fn update_task_workspace(
        &self,
        task_id: &TaskId,
        workspace_id: &WorkspaceId,
    ) -> Result<(), CollaboratorError>;

    fn log_event(&self, event: &DaemonEvent) -> Result<(), CollaboratorError>;
}

/// Tool-binding collaborator: the tools a task runs operate inside the
/// workspace the registry is bound to.
pub trait ToolRegistry: Send + Sync {
    fn set_workspace(&self, workspace: &Workspace) -> Result<(), CollaboratorError>;
}

// ── Types ──────────────────────────────────────────────────────────

/// Why an auto-switch was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    AmbiguousTempWorkspace,
}

impl SwitchReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchReason::AmbiguousTempWorkspace => "ambiguous_temp_workspace",
        }
    }
}

/// Audit record handed to [`Daemon::log_event`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaemonEvent {
    pub kind: &'static str,
    pub task_id: TaskId,
    pub at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Result of an auto-switch attempt. Every variant other than `Switched`
/// leaves all state exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched { from: WorkspaceId, to: WorkspaceId },
    /// The daemon knows no non-temp workspace.
    NoCandidate,
    /// The candidate does not look like a project, or its lookup failed.
    InsufficientSignals,
    Failed(SwitchError),
}

/// Fully-resolved state of a switch, computed before anything is applied.
#[derive(Debug, Clone)]
struct SwitchPlan {
    previous: Workspace,
    /// The task's own workspace id, which may differ from `previous.id`.
    previous_task_workspace: WorkspaceId,
    next: Workspace,
    event: DaemonEvent,
}

// ── WorkspaceAutoSwitcher ──────────────────────────────────────────

pub struct WorkspaceAutoSwitcher {
    daemon: Arc<dyn Daemon>,
    tools: Arc<dyn ToolRegistry>,
    signals: Arc<dyn SignalProvider>,
}

impl WorkspaceAutoSwitcher {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        tools: Arc<dyn ToolRegistry>,
        signals: Arc<dyn SignalProvider>,
    ) -> Self {
        Self {
            daemon,
            tools,
            signals,
        }
    }

    /// Move `task` to the most recent project workspace. Returns `true` if
    /// the switch happened.
    pub fn try_auto_switch_to_preferred_workspace_for_ambiguous_task(
        &self,
        task: &mut Task,
        workspace: &mut Workspace,
        reason: SwitchReason,
    ) -> bool {
        matches!(
            self.attempt(task, workspace, reason),
            SwitchOutcome::Switched { .. }
        )
    }

    /// Like
    /// [`try_auto_switch_to_preferred_workspace_for_ambiguous_task`](Self::try_auto_switch_to_preferred_workspace_for_ambiguous_task)
    /// but reports why a switch did not happen.
    pub fn attempt(
        &self,
        task: &mut Task,
        workspace: &mut Workspace,
        reason: SwitchReason,
    ) -> SwitchOutcome {
        let plan = match self.plan(task, workspace, reason) {
            Ok(plan) => plan,
            Err(outcome) => return outcome,
        };

        if let Err(e) = self.apply(&task.id, &plan) {
            warn!(task_id = %task.id, "Workspace auto-switch rolled back: {e}");
            return SwitchOutcome::Failed(e);
        }

        let from = plan.previous.id.clone();
        let to = plan.next.id.clone();
        task.workspace_id = to.clone();
        *workspace = plan.next;
        info!(task_id = %task.id, %from, %to, reason = reason.as_str(), "Workspace auto-switched");
        SwitchOutcome::Switched { from, to }
    }

    fn plan(
        &self,
        task: &Task,
        workspace: &Workspace,
        reason: SwitchReason,
    ) -> Result<SwitchPlan, SwitchOutcome> {
        let Some(candidate) = self.daemon.most_recent_non_temp_workspace() else {
            debug!(task_id = %task.id, "No non-temp workspace to switch to");
            return Err(SwitchOutcome::NoCandidate);
        };
        if candidate.is_temp {
            return Err(SwitchOutcome::NoCandidate);
        }

        let suitable = self
            .signals
            .signals_for_path(&candidate.path)
            .is_some_and(|s| s.looks_like_project());
        if !suitable {
            debug!(
                task_id = %task.id,
                candidate = %candidate.path.display(),
                "Auto-switch candidate lacks project signals"
            );
            return Err(SwitchOutcome::InsufficientSignals);
        }

        let event = DaemonEvent {
            kind: "workspace_auto_switched",
            task_id: task.id.clone(),
            at: Utc::now(),
            payload: json!({
                "reason": reason.as_str(),
                "from_workspace_id": workspace.id,
                "to_workspace_id": candidate.id,
                "to_path": candidate.path,
            }),
        };
        Ok(SwitchPlan {
            previous: workspace.clone(),
            previous_task_workspace: task.workspace_id.clone(),
            next: candidate,
            event,
        })
    }

    fn apply(&self, task_id: &TaskId, plan: &SwitchPlan) -> Result<(), SwitchError> {
        self.tools
            .set_workspace(&plan.next)
            .map_err(SwitchError::ToolRegistry)?;

        if let Err(e) = self.daemon.update_task_workspace(task_id, &plan.next.id) {
            self.rebind_tools(&plan.previous);
            return Err(SwitchError::PersistTask(e));
        }

        if let Err(e) = self.daemon.log_event(&plan.event) {
            if let Err(undo) = self
                .daemon
                .update_task_workspace(task_id, &plan.previous_task_workspace)
            {
                error!(%task_id, "Failed to restore task workspace after aborted switch: {undo}");
            }
            self.rebind_tools(&plan.previous);
            return Err(SwitchError::LogEvent(e));
        }
        Ok(())
    }

    fn rebind_tools(&self, previous: &Workspace) {
        if let Err(e) = self.tools.set_workspace(previous) {
            error!(workspace_id = %previous.id, "Failed to rebind tools after aborted switch: {e}");
        }
    }
}

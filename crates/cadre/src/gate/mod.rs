//! Preflight gate consulted before every tool and shell action.
//!
//! The gate decides whether a task may proceed or must pause for a human
//! acknowledgement. It has two independent checks, each an ordered list of
//! guards evaluated top to bottom where the first guard that decides wins:
//!
//! | Check | Guards (in order) | Fallback |
//! |-------|-------------------|----------|
//! | workspace | capability upgrade, internal app change, acknowledged, no workspace need, ambiguous in temp, needs existing in temp, needs existing mismatch | pass |
//! | shell | no execution requested, shell permitted, shell opt-out | pause |
//!
//! A pause calls [`PauseSink::pause_for_user_input`] exactly once. A pass has
//! no side effect, except that an ambiguous task in a temp workspace first
//! attempts an [auto-switch](crate::switcher::WorkspaceAutoSwitcher).
//!
//! The gate never reads or writes scheduler state.
//!
//! ```ignore
//! let gate = PreflightGate::heuristic(prompts.clone())
//!     .with_auto_switcher(switcher);
//!
//! if gate.preflight_workspace_check(&mut task, &mut workspace) {
//!     return; // halted until the user answers the prompt
//! }
//! if needs_shell && gate.preflight_shell_execution_check(&task, &workspace) {
//!     return;
//! }
//! ```

pub mod intent;
pub mod rules;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::signals::{FsSignalProvider, SignalProvider};
use crate::switcher::WorkspaceAutoSwitcher;
use crate::task::{Task, Workspace};

pub use intent::HeuristicClassifier;
pub use rules::{RuleOutcome, ShellCheck, ShellGuard, WorkspaceCheck, WorkspaceGuard};

// ── Types ──────────────────────────────────────────────────────────

/// Why a task was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// The task needs an existing project but is bound to a temp workspace.
    WorkspaceRequired,
    /// The task needs an existing project and the bound workspace does not
    /// look like one.
    WorkspaceMismatch,
    /// The task wants to run an execution tool without shell permission.
    ShellPermissionRequired,
}

impl PauseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseReason::WorkspaceRequired => "workspace_required",
            PauseReason::WorkspaceMismatch => "workspace_mismatch",
            PauseReason::ShellPermissionRequired => "shell_permission_required",
        }
    }

    /// Whether the reason comes from the workspace check.
    pub fn is_workspace_reason(self) -> bool {
        matches!(
            self,
            PauseReason::WorkspaceRequired | PauseReason::WorkspaceMismatch
        )
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Pass,
    Pause(PauseReason),
}

impl GateVerdict {
    pub fn is_pause(self) -> bool {
        matches!(self, GateVerdict::Pause(_))
    }

    pub fn reason(self) -> Option<PauseReason> {
        match self {
            GateVerdict::Pass => None,
            GateVerdict::Pause(reason) => Some(reason),
        }
    }
}

/// What kind of workspace a task needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceNeed {
    /// The task refers to a project that already exists.
    NeedsExisting,
    /// The task may touch files, but it is unclear where.
    Ambiguous,
    /// The task does not need a workspace.
    None,
}

// ── Collaborators ──────────────────────────────────────────────────

/// Classifies tasks for the workspace check.
pub trait WorkspaceClassifier: Send + Sync {
    fn classify_workspace_need(&self, task: &Task) -> WorkspaceNeed;

    /// Whether the action targets the agent app or its own tools rather than
    /// project files.
    fn is_internal_app_or_tool_change_intent(&self, task: &Task) -> bool;
}

/// Surfaces a resumable prompt to the user. The executor must halt tool
/// dispatch for the task until the user responds.
pub trait PauseSink: Send + Sync {
    fn pause_for_user_input(&self, task: &Task, reason: PauseReason);
}

// ── PreflightGate ──────────────────────────────────────────────────

/// The two preflight checks and their collaborators.
pub struct PreflightGate {
    classifier: Arc<dyn WorkspaceClassifier>,
    signals: Arc<dyn SignalProvider>,
    pauses: Arc<dyn PauseSink>,
    switcher: Option<Arc<WorkspaceAutoSwitcher>>,
    workspace_guards: Vec<Box<dyn WorkspaceGuard>>,
    shell_guards: Vec<Box<dyn ShellGuard>>,
}

impl PreflightGate {
    pub fn new(
        classifier: Arc<dyn WorkspaceClassifier>,
        signals: Arc<dyn SignalProvider>,
        pauses: Arc<dyn PauseSink>,
    ) -> Self {
        Self {
            classifier,
            signals,
            pauses,
            switcher: None,
            workspace_guards: rules::default_workspace_guards(),
            shell_guards: rules::default_shell_guards(),
        }
    }

    /// A gate using [`HeuristicClassifier`] and [`FsSignalProvider`].
    pub fn heuristic(pauses: Arc<dyn PauseSink>) -> Self {
        Self::new(
            Arc::new(HeuristicClassifier),
            Arc::new(FsSignalProvider),
            pauses,
        )
    }

    /// Enable auto-switching for ambiguous tasks in temp workspaces. Without
    /// a switcher such tasks still pass.
    pub fn with_auto_switcher(mut self, switcher: Arc<WorkspaceAutoSwitcher>) -> Self {
        self.switcher = Some(switcher);
        self
    }

    /// Replace the workspace guard list.
    pub fn with_workspace_guards(mut self, guards: Vec<Box<dyn WorkspaceGuard>>) -> Self {
        self.workspace_guards = guards;
        self
    }

    /// Replace the shell guard list.
    pub fn with_shell_guards(mut self, guards: Vec<Box<dyn ShellGuard>>) -> Self {
        self.shell_guards = guards;
        self
    }

    /// Run the workspace check. Returns `true` if the task was paused.
    ///
    /// `task` and `workspace` may be replaced by an auto-switch.
    pub fn preflight_workspace_check(&self, task: &mut Task, workspace: &mut Workspace) -> bool {
        self.check_workspace(task, workspace).is_pause()
    }

    /// Run the shell check. Returns `true` if the task was paused.
    pub fn preflight_shell_execution_check(&self, task: &Task, workspace: &Workspace) -> bool {
        self.check_shell(task, workspace).is_pause()
    }

    /// Run the workspace check, pausing on a `Pause` verdict.
    pub fn check_workspace(&self, task: &mut Task, workspace: &mut Workspace) -> GateVerdict {
        let verdict = self.evaluate_workspace(task, workspace);
        self.settle(task, verdict)
    }

    /// Run the shell check, pausing on a `Pause` verdict.
    pub fn check_shell(&self, task: &Task, workspace: &Workspace) -> GateVerdict {
        let verdict = self.evaluate_shell(task, workspace);
        self.settle(task, verdict)
    }

    /// Run the workspace check, then the shell check if the workspace check
    /// did not pause. At most one prompt is raised per call.
    pub fn check_tool_call(&self, task: &mut Task, workspace: &mut Workspace) -> GateVerdict {
        let verdict = self.check_workspace(task, workspace);
        if verdict.is_pause() {
            return verdict;
        }
        self.check_shell(task, workspace)
    }

    /// Evaluate the workspace guards without calling the pause sink.
    pub fn evaluate_workspace(&self, task: &mut Task, workspace: &mut Workspace) -> GateVerdict {
        let mut check = WorkspaceCheck::new(
            task,
            workspace,
            self.classifier.as_ref(),
            self.signals.as_ref(),
            self.switcher.as_deref(),
        );
        for guard in &self.workspace_guards {
            match guard.evaluate(&mut check) {
                RuleOutcome::Next => continue,
                RuleOutcome::Pass => {
                    debug!(
                        task_id = %check.task.id,
                        rule = guard.name(),
                        "Workspace preflight passed"
                    );
                    return GateVerdict::Pass;
                }
                RuleOutcome::Pause(reason) => {
                    debug!(
                        task_id = %check.task.id,
                        rule = guard.name(),
                        %reason,
                        "Workspace preflight paused"
                    );
                    return GateVerdict::Pause(reason);
                }
            }
        }
        GateVerdict::Pass
    }

    /// Evaluate the shell guards without calling the pause sink.
    pub fn evaluate_shell(&self, task: &Task, workspace: &Workspace) -> GateVerdict {
        let check = ShellCheck { task, workspace };
        for guard in &self.shell_guards {
            match guard.evaluate(&check) {
                RuleOutcome::Next => continue,
                RuleOutcome::Pass => {
                    debug!(task_id = %task.id, rule = guard.name(), "Shell preflight passed");
                    return GateVerdict::Pass;
                }
                RuleOutcome::Pause(reason) => return GateVerdict::Pause(reason),
            }
        }
        GateVerdict::Pause(PauseReason::ShellPermissionRequired)
    }

    fn settle(&self, task: &Task, verdict: GateVerdict) -> GateVerdict {
        if let GateVerdict::Pause(reason) = verdict {
            info!(task_id = %task.id, %reason, "Pausing task for user input");
            self.pauses.pause_for_user_input(task, reason);
        }
        verdict
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::signals::WorkspaceSignals;
    use crate::task::{GateFlags, TaskId};

    fn gate(need: WorkspaceNeed, signals: MapSignals) -> (PreflightGate, Arc<RecordingPauses>) {
        let pauses = Arc::new(RecordingPauses::default());
        let gate = PreflightGate::new(
            Arc::new(FixedClassifier {
                need,
                internal: false,
            }),
            Arc::new(signals),
            pauses.clone(),
        );
        (gate, pauses)
    }

    fn task() -> Task {
        Task::new(TaskId::new("t-1").unwrap(), "tmp", "do the thing")
    }

    #[test]
    fn needs_existing_in_temp_pauses_once_with_workspace_required() {
        let (gate, pauses) = gate(WorkspaceNeed::NeedsExisting, MapSignals::default());
        let mut task = task();
        let mut ws = Workspace::temp("tmp", "/tmp/scratch");

        assert!(gate.preflight_workspace_check(&mut task, &mut ws));
        assert_eq!(
            pauses.calls(),
            vec![("t-1".to_string(), PauseReason::WorkspaceRequired)]
        );
    }

    #[test]
    fn needs_existing_in_non_project_workspace_is_mismatch() {
        let signals = MapSignals::default().with("/home/me/Documents", WorkspaceSignals::default());
        let (gate, pauses) = gate(WorkspaceNeed::NeedsExisting, signals);
        let mut task = task();
        let mut ws = Workspace::project("docs", "/home/me/Documents");

        assert_eq!(
            gate.check_workspace(&mut task, &mut ws),
            GateVerdict::Pause(PauseReason::WorkspaceMismatch)
        );
        assert_eq!(pauses.calls().len(), 1);
    }

    #[test]
    fn needs_existing_in_matching_project_passes() {
        let signals = MapSignals::default().with("/home/me/app", PROJECT);
        let (gate, pauses) = gate(WorkspaceNeed::NeedsExisting, signals);
        let mut task = task();
        let mut ws = Workspace::project("app", "/home/me/app");

        assert!(!gate.preflight_workspace_check(&mut task, &mut ws));
        assert!(pauses.calls().is_empty());
    }

    #[test]
    fn failed_signal_lookup_for_needs_existing_pauses() {
        let (gate, _) = gate(WorkspaceNeed::NeedsExisting, MapSignals::default());
        let mut task = task();
        let mut ws = Workspace::project("gone", "/home/me/deleted");
        assert_eq!(
            gate.check_workspace(&mut task, &mut ws),
            GateVerdict::Pause(PauseReason::WorkspaceMismatch)
        );
    }

    #[test]
    fn acknowledged_task_never_pauses() {
        let (gate, pauses) = gate(WorkspaceNeed::NeedsExisting, MapSignals::default());
        let mut task = task().with_flags(GateFlags {
            workspace_preflight_acknowledged: true,
            ..GateFlags::default()
        });
        let mut temp = Workspace::temp("tmp", "/tmp/scratch");
        let mut other = Workspace::project("docs", "/home/me/Documents");

        assert!(!gate.preflight_workspace_check(&mut task, &mut temp));
        assert!(!gate.preflight_workspace_check(&mut task, &mut other));
        assert!(pauses.calls().is_empty());
    }

    #[test]
    fn ambiguous_in_temp_without_switcher_passes() {
        let (gate, pauses) = gate(WorkspaceNeed::Ambiguous, MapSignals::default());
        let mut task = task();
        let mut ws = Workspace::temp("tmp", "/tmp/scratch");
        let before = ws.clone();

        assert!(!gate.preflight_workspace_check(&mut task, &mut ws));
        assert_eq!(ws, before);
        assert!(pauses.calls().is_empty());
    }

    #[test]
    fn shell_check_truth_table() {
        let (gate, pauses) = gate(WorkspaceNeed::None, MapSignals::default());
        let ws = Workspace::project("app", "/home/me/app");
        let mut task = task();

        // No execution requested.
        assert!(!gate.preflight_shell_execution_check(&task, &ws));

        task.flags.requires_execution_tool_run = true;
        assert_eq!(
            gate.check_shell(&task, &ws),
            GateVerdict::Pause(PauseReason::ShellPermissionRequired)
        );

        task.flags.allow_execution_without_shell = true;
        assert!(!gate.preflight_shell_execution_check(&task, &ws));

        task.flags.allow_execution_without_shell = false;
        let ws = ws.with_shell(true);
        assert!(!gate.preflight_shell_execution_check(&task, &ws));

        assert_eq!(pauses.calls().len(), 1);
    }

    #[test]
    fn tool_call_skips_shell_check_after_workspace_pause() {
        let (gate, pauses) = gate(WorkspaceNeed::NeedsExisting, MapSignals::default());
        let mut task = task();
        task.flags.requires_execution_tool_run = true;
        let mut ws = Workspace::temp("tmp", "/tmp/scratch");

        assert_eq!(
            gate.check_tool_call(&mut task, &mut ws),
            GateVerdict::Pause(PauseReason::WorkspaceRequired)
        );
        assert_eq!(
            pauses.calls(),
            vec![("t-1".to_string(), PauseReason::WorkspaceRequired)]
        );
    }

    #[test]
    fn tool_call_runs_shell_check_when_workspace_passes() {
        let (gate, pauses) = gate(WorkspaceNeed::None, MapSignals::default());
        let mut task = task();
        task.flags.requires_execution_tool_run = true;
        let mut ws = Workspace::project("app", "/home/me/app");

        assert_eq!(
            gate.check_tool_call(&mut task, &mut ws),
            GateVerdict::Pause(PauseReason::ShellPermissionRequired)
        );
        assert_eq!(pauses.calls().len(), 1);
    }

    #[test]
    fn evaluate_does_not_call_pause_sink() {
        let (gate, pauses) = gate(WorkspaceNeed::NeedsExisting, MapSignals::default());
        let mut task = task();
        let mut ws = Workspace::temp("tmp", "/tmp/scratch");
        assert!(gate.evaluate_workspace(&mut task, &mut ws).is_pause());
        task.flags.requires_execution_tool_run = true;
        assert!(gate.evaluate_shell(&task, &ws).is_pause());
        assert!(pauses.calls().is_empty());
    }

    #[test]
    fn empty_shell_guard_list_falls_back_to_pause() {
        let (gate, _) = gate(WorkspaceNeed::None, MapSignals::default());
        let gate = gate.with_shell_guards(Vec::new());
        let task = task();
        let ws = Workspace::project("app", "/home/me/app").with_shell(true);
        assert_eq!(
            gate.evaluate_shell(&task, &ws),
            GateVerdict::Pause(PauseReason::ShellPermissionRequired)
        );
    }

    #[test]
    fn empty_workspace_guard_list_falls_back_to_pass() {
        let (gate, _) = gate(WorkspaceNeed::NeedsExisting, MapSignals::default());
        let gate = gate.with_workspace_guards(Vec::new());
        let mut task = task();
        let mut ws = Workspace::temp("tmp", "/tmp/scratch");
        assert_eq!(gate.evaluate_workspace(&mut task, &mut ws), GateVerdict::Pass);
    }

    #[test]
    fn pause_reason_strings() {
        assert_eq!(PauseReason::WorkspaceRequired.to_string(), "workspace_required");
        assert_eq!(
            serde_json::to_value(PauseReason::ShellPermissionRequired).unwrap(),
            "shell_permission_required"
        );
        assert!(PauseReason::WorkspaceMismatch.is_workspace_reason());
        assert!(!PauseReason::ShellPermissionRequired.is_workspace_reason());
    }
}

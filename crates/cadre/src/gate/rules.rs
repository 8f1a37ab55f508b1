//! Ordered guard rules for the two preflight checks.
//!
//! Each guard inspects the check context and either decides
//! ([`RuleOutcome::Pass`] / [`RuleOutcome::Pause`]) or defers to the next
//! guard ([`RuleOutcome::Next`]). Precedence is the list order returned by
//! [`default_workspace_guards`] and [`default_shell_guards`].

use tracing::debug;

use super::{PauseReason, WorkspaceClassifier, WorkspaceNeed};
use crate::signals::{SignalProvider, WorkspaceSignals};
use crate::switcher::{SwitchReason, WorkspaceAutoSwitcher};
use crate::task::{Task, Workspace};

/// Decision of a single guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Not this guard's call; evaluate the next one.
    Next,
    Pass,
    Pause(PauseReason),
}

impl RuleOutcome {
    fn pass_if(condition: bool) -> Self {
        if condition {
            RuleOutcome::Pass
        } else {
            RuleOutcome::Next
        }
    }

    fn pause_if(condition: bool, reason: PauseReason) -> Self {
        if condition {
            RuleOutcome::Pause(reason)
        } else {
            RuleOutcome::Next
        }
    }
}

// ── Workspace check ────────────────────────────────────────────────

/// Context handed to each [`WorkspaceGuard`].
///
/// The need classification is computed on first use and shared by the
/// remaining guards, so guards that pass early never call the classifier.
pub struct WorkspaceCheck<'a> {
    pub task: &'a mut Task,
    pub workspace: &'a mut Workspace,
    classifier: &'a dyn WorkspaceClassifier,
    signals: &'a dyn SignalProvider,
    switcher: Option<&'a WorkspaceAutoSwitcher>,
    need: Option<WorkspaceNeed>,
}

impl<'a> WorkspaceCheck<'a> {
    pub(crate) fn new(
        task: &'a mut Task,
        workspace: &'a mut Workspace,
        classifier: &'a dyn WorkspaceClassifier,
        signals: &'a dyn SignalProvider,
        switcher: Option<&'a WorkspaceAutoSwitcher>,
    ) -> Self {
        Self {
            task,
            workspace,
            classifier,
            signals,
            switcher,
            need: None,
        }
    }

    pub fn need(&mut self) -> WorkspaceNeed {
        if let Some(need) = self.need {
            return need;
        }
        let need = self.classifier.classify_workspace_need(&*self.task);
        self.need = Some(need);
        need
    }

    pub fn is_internal_app_change(&self) -> bool {
        self.classifier.is_internal_app_or_tool_change_intent(&*self.task)
    }

    /// Signals for the currently bound workspace.
    pub fn workspace_signals(&self) -> Option<WorkspaceSignals> {
        self.signals.signals_for_workspace(&*self.workspace)
    }

    /// Attempt an auto-switch. Returns `false` when no switcher is
    /// configured or the switch did not happen.
    pub fn try_auto_switch(&mut self, reason: SwitchReason) -> bool {
        let Some(switcher) = self.switcher else {
            return false;
        };
        switcher.try_auto_switch_to_preferred_workspace_for_ambiguous_task(
            self.task,
            self.workspace,
            reason,
        )
    }
}

/// One rule of the workspace check.
pub trait WorkspaceGuard: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
    fn evaluate(&self, check: &mut WorkspaceCheck<'_>) -> RuleOutcome;
}

/// The user is explicitly broadening permissions.
pub struct CapabilityUpgrade;

impl WorkspaceGuard for CapabilityUpgrade {
    fn name(&self) -> &'static str {
        "capability_upgrade"
    }

    fn evaluate(&self, check: &mut WorkspaceCheck<'_>) -> RuleOutcome {
        RuleOutcome::pass_if(check.task.flags.capability_upgrade_requested)
    }
}

/// The action targets the app or its tools, so workspace relevance does not
/// apply.
pub struct InternalAppChange;

impl WorkspaceGuard for InternalAppChange {
    fn name(&self) -> &'static str {
        "internal_app_change"
    }

    fn evaluate(&self, check: &mut WorkspaceCheck<'_>) -> RuleOutcome {
        RuleOutcome::pass_if(check.is_internal_app_change())
    }
}

/// Never re-ask once the user acknowledged a workspace prompt.
pub struct Acknowledged;

impl WorkspaceGuard for Acknowledged {
    fn name(&self) -> &'static str {
        "acknowledged"
    }

    fn evaluate(&self, check: &mut WorkspaceCheck<'_>) -> RuleOutcome {
        RuleOutcome::pass_if(check.task.flags.workspace_preflight_acknowledged)
    }
}

pub struct NoWorkspaceNeed;

impl WorkspaceGuard for NoWorkspaceNeed {
    fn name(&self) -> &'static str {
        "no_workspace_need"
    }

    fn evaluate(&self, check: &mut WorkspaceCheck<'_>) -> RuleOutcome {
        RuleOutcome::pass_if(check.need() == WorkspaceNeed::None)
    }
}

/// Ambiguous intent in a temp workspace tries to move to the most recent
/// project workspace, then proceeds whether or not that worked.
pub struct AmbiguousInTemp;

impl WorkspaceGuard for AmbiguousInTemp {
    fn name(&self) -> &'static str {
        "ambiguous_in_temp"
    }

    fn evaluate(&self, check: &mut WorkspaceCheck<'_>) -> RuleOutcome {
        if check.need() != WorkspaceNeed::Ambiguous || !check.workspace.is_temp {
            return RuleOutcome::Next;
        }
        let switched = check.try_auto_switch(SwitchReason::AmbiguousTempWorkspace);
        debug!(task_id = %check.task.id, switched, "Ambiguous task in temp workspace");
        RuleOutcome::Pass
    }
}

pub struct NeedsExistingInTemp;

impl WorkspaceGuard for NeedsExistingInTemp {
    fn name(&self) -> &'static str {
        "needs_existing_in_temp"
    }

    fn evaluate(&self, check: &mut WorkspaceCheck<'_>) -> RuleOutcome {
        let temp = check.workspace.is_temp;
        RuleOutcome::pause_if(
            check.need() == WorkspaceNeed::NeedsExisting && temp,
            PauseReason::WorkspaceRequired,
        )
    }
}

/// A non-temp workspace without project signals (or whose lookup failed)
/// does not match a task that needs an existing project.
pub struct NeedsExistingMismatch;

impl WorkspaceGuard for NeedsExistingMismatch {
    fn name(&self) -> &'static str {
        "needs_existing_mismatch"
    }

    fn evaluate(&self, check: &mut WorkspaceCheck<'_>) -> RuleOutcome {
        if check.need() != WorkspaceNeed::NeedsExisting || check.workspace.is_temp {
            return RuleOutcome::Next;
        }
        let matches = check
            .workspace_signals()
            .is_some_and(|s| s.looks_like_project());
        RuleOutcome::pause_if(!matches, PauseReason::WorkspaceMismatch)
    }
}

/// The workspace guards in precedence order.
pub fn default_workspace_guards() -> Vec<Box<dyn WorkspaceGuard>> {
    vec![
        Box::new(CapabilityUpgrade),
        Box::new(InternalAppChange),
        Box::new(Acknowledged),
        Box::new(NoWorkspaceNeed),
        Box::new(AmbiguousInTemp),
        Box::new(NeedsExistingInTemp),
        Box::new(NeedsExistingMismatch),
    ]
}

// ── Shell check ────────────────────────────────────────────────────

/// Context handed to each [`ShellGuard`].
pub struct ShellCheck<'a> {
    pub task: &'a Task,
    pub workspace: &'a Workspace,
}

/// One rule of the shell check.
pub trait ShellGuard: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, check: &ShellCheck<'_>) -> RuleOutcome;
}

pub struct NoExecutionRequested;

impl ShellGuard for NoExecutionRequested {
    fn name(&self) -> &'static str {
        "no_execution_requested"
    }

    fn evaluate(&self, check: &ShellCheck<'_>) -> RuleOutcome {
        RuleOutcome::pass_if(!check.task.flags.requires_execution_tool_run)
    }
}

pub struct ShellPermitted;

impl ShellGuard for ShellPermitted {
    fn name(&self) -> &'static str {
        "shell_permitted"
    }

    fn evaluate(&self, check: &ShellCheck<'_>) -> RuleOutcome {
        RuleOutcome::pass_if(check.workspace.permissions.shell)
    }
}

/// The user already chose to continue this task without a shell.
pub struct ShellOptOut;

impl ShellGuard for ShellOptOut {
    fn name(&self) -> &'static str {
        "shell_opt_out"
    }

    fn evaluate(&self, check: &ShellCheck<'_>) -> RuleOutcome {
        RuleOutcome::pass_if(check.task.flags.allow_execution_without_shell)
    }
}

/// The shell guards in precedence order. Falling off the end pauses.
pub fn default_shell_guards() -> Vec<Box<dyn ShellGuard>> {
    vec![
        Box::new(NoExecutionRequested),
        Box::new(ShellPermitted),
        Box::new(ShellOptOut),
    ]
}

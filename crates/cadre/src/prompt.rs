//! Pending pause prompts and the user's answers to them.
//!
//! [`PromptBoard`] is the in-process [`PauseSink`]: when the gate pauses a
//! task, a [`PausePrompt`] is posted for it (replacing any earlier one). A UI
//! frontend lists [`pending`](PromptBoard::pending) prompts and calls
//! [`respond`](PromptBoard::respond); the executor collects the answer with
//! [`take_response`](PromptBoard::take_response) and applies it with
//! [`apply_choice`](PromptBoard::apply_choice), which sets the task's
//! acknowledgement flag so the same reason never fires again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PromptError;
use crate::gate::{PauseReason, PauseSink};
use crate::task::{Task, TaskId, Workspace};

/// An answer the user can give to a pause prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptChoice {
    /// Proceed in the current workspace.
    Continue,
    /// Grant shell permission to the workspace.
    EnableShell,
    /// Proceed without shell access for this task.
    ContinueWithoutShell,
    Cancel,
}

impl PromptChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptChoice::Continue => "continue",
            PromptChoice::EnableShell => "enable_shell",
            PromptChoice::ContinueWithoutShell => "continue_without_shell",
            PromptChoice::Cancel => "cancel",
        }
    }

    /// The choices offered for a pause reason.
    pub fn offered_for(reason: PauseReason) -> &'static [PromptChoice] {
        match reason {
            PauseReason::WorkspaceRequired | PauseReason::WorkspaceMismatch => {
                &[PromptChoice::Continue, PromptChoice::Cancel]
            }
            PauseReason::ShellPermissionRequired => &[
                PromptChoice::EnableShell,
                PromptChoice::ContinueWithoutShell,
                PromptChoice::Cancel,
            ],
        }
    }
}

impl fmt::Display for PromptChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the executor should do after applying a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resume,
    Cancel,
}

/// A prompt waiting on the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausePrompt {
    pub task_id: TaskId,
    pub reason: PauseReason,
    /// Human-readable explanation shown to the user.
    pub message: String,
    pub choices: Vec<PromptChoice>,
    pub created_at: DateTime<Utc>,
    /// Set by [`PromptBoard::respond`].
    pub response: Option<PromptChoice>,
}

fn message_for(task: &Task, reason: PauseReason) -> String {
    let subject = if task.title.is_empty() {
        format!("Task {}", task.id)
    } else {
        format!("\"{}\"", task.title)
    };
    match reason {
        PauseReason::WorkspaceRequired => format!(
            "{subject} looks like it needs an existing project, but it is running in a \
             temporary workspace. Choose a project workspace or continue here."
        ),
        PauseReason::WorkspaceMismatch => format!(
            "{subject} looks like it needs an existing project, but the current workspace \
             does not look like one. Continue anyway?"
        ),
        PauseReason::ShellPermissionRequired => format!(
            "{subject} wants to run commands, but shell access is disabled for this workspace."
        ),
    }
}

/// In-process store of pause prompts, at most one per task.
#[derive(Default)]
pub struct PromptBoard {
    prompts: Mutex<HashMap<TaskId, PausePrompt>>,
}

impl PromptBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, PausePrompt>> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All prompts, oldest first.
    pub fn pending(&self) -> Vec<PausePrompt> {
        let mut prompts: Vec<_> = self.lock().values().cloned().collect();
        prompts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        prompts
    }

    pub fn get(&self, task_id: &TaskId) -> Option<PausePrompt> {
        self.lock().get(task_id).cloned()
    }

    /// Whether the task has a prompt the user has not answered yet.
    pub fn is_waiting(&self, task_id: &TaskId) -> bool {
        self.lock().get(task_id).is_some_and(|p| p.response.is_none())
    }

    /// Record the user's answer.
    pub fn respond(&self, task_id: &TaskId, choice: PromptChoice) -> Result<(), PromptError> {
        let mut prompts = self.lock();
        let prompt = prompts
            .get_mut(task_id)
            .ok_or_else(|| PromptError::NotPending(task_id.clone()))?;
        if !prompt.choices.contains(&choice) {
            return Err(PromptError::ChoiceNotOffered {
                reason: prompt.reason,
                choice: choice.as_str(),
            });
        }
        debug!(%task_id, %choice, "Prompt answered");
        prompt.response = Some(choice);
        Ok(())
    }

    /// Remove and return an answered prompt's reason and choice. Returns
    /// `None` while the user has not answered.
    pub fn take_response(&self, task_id: &TaskId) -> Option<(PauseReason, PromptChoice)> {
        let mut prompts = self.lock();
        let answered = prompts.get(task_id)?.response?;
        let prompt = prompts.remove(task_id)?;
        Some((prompt.reason, answered))
    }

    /// Drop any prompt for the task (e.g. on cancellation).
    pub fn dismiss(&self, task_id: &TaskId) {
        self.lock().remove(task_id);
    }

    /// Apply an answer to the task it belongs to.
    ///
    /// Setting the acknowledgement flag is what keeps the same reason from
    /// firing again for this task.
    pub fn apply_choice(
        task: &mut Task,
        workspace: &mut Workspace,
        reason: PauseReason,
        choice: PromptChoice,
    ) -> Result<Resolution, PromptError> {
        if !PromptChoice::offered_for(reason).contains(&choice) {
            return Err(PromptError::ChoiceNotOffered {
                reason,
                choice: choice.as_str(),
            });
        }
        match choice {
            PromptChoice::Cancel => return Ok(Resolution::Cancel),
            PromptChoice::Continue => task.flags.workspace_preflight_acknowledged = true,
            PromptChoice::EnableShell => workspace.permissions.shell = true,
            PromptChoice::ContinueWithoutShell => task.flags.allow_execution_without_shell = true,
        }
        Ok(Resolution::Resume)
    }
}

impl PauseSink for PromptBoard {
    fn pause_for_user_input(&self, task: &Task, reason: PauseReason) {
        let prompt = PausePrompt {
            task_id: task.id.clone(),
            reason,
            message: message_for(task, reason),
            choices: PromptChoice::offered_for(reason).to_vec(),
            created_at: Utc::now(),
            response: None,
        };
        info!(task_id = %task.id, %reason, "Prompt posted");
        self.lock().insert(task.id.clone(), prompt);
    }
}

//! The executor-facing facade.
//!
//! [`Orchestrator`] holds one scheduler, one gate, one compactor and the
//! prompt board the gate pauses into, and exposes the control flow a task
//! executor drives:
//!
//! 1. [`submit`](Orchestrator::submit) a task; it starts now or queues.
//! 2. Before every tool call, [`check_tool_call`](Orchestrator::check_tool_call).
//!    On `Halt` the executor stops dispatching until
//!    [`resume`](Orchestrator::resume) reports the user's answer.
//! 3. Before every LLM turn, [`prepare_turn`](Orchestrator::prepare_turn).
//! 4. [`finish`](Orchestrator::finish) or [`cancel`](Orchestrator::cancel).

use std::sync::Arc;

use tracing::{debug, info};

use crate::Message;
use crate::config::SchedulerSettings;
use crate::context::{CompactionResult, CompactorConfig, ContextCompactor};
use crate::error::PromptError;
use crate::gate::{GateVerdict, PauseReason, PreflightGate};
use crate::prompt::{PromptBoard, Resolution};
use crate::scheduler::{Admission, TaskRunner, TaskScheduler};
use crate::task::{Task, TaskId, TaskStatus, Workspace};

/// Whether the executor may dispatch the tool call it asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolDispatch {
    Proceed,
    /// The task is paused; a prompt is waiting on the board.
    Halt(PauseReason),
}

pub struct Orchestrator {
    scheduler: TaskScheduler,
    gate: PreflightGate,
    compactor: ContextCompactor,
    prompts: Arc<PromptBoard>,
}

impl Orchestrator {
    /// `gate` should pause into `prompts`, or [`resume`](Self::resume) will
    /// never see an answer.
    pub fn new(
        scheduler: TaskScheduler,
        gate: PreflightGate,
        compactor: ContextCompactor,
        prompts: Arc<PromptBoard>,
    ) -> Self {
        Self {
            scheduler,
            gate,
            compactor,
            prompts,
        }
    }

    /// An orchestrator using the heuristic gate collaborators and a
    /// compactor sized for `model`.
    pub fn heuristic(
        settings: SchedulerSettings,
        runner: Arc<dyn TaskRunner>,
        model: &str,
    ) -> Self {
        let prompts = Arc::new(PromptBoard::new());
        let gate = PreflightGate::heuristic(prompts.clone());
        Self::new(
            TaskScheduler::new(settings, runner),
            gate,
            ContextCompactor::for_model(model, CompactorConfig::default()),
            prompts,
        )
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn gate(&self) -> &PreflightGate {
        &self.gate
    }

    pub fn compactor(&self) -> &ContextCompactor {
        &self.compactor
    }

    pub fn prompts(&self) -> &Arc<PromptBoard> {
        &self.prompts
    }

    /// Admit or queue a task and record the result in its status.
    pub fn submit(&self, task: &mut Task) -> Admission {
        let admission = self.scheduler.enqueue(task);
        task.status = admission.task_status();
        admission
    }

    /// Run both preflight checks ahead of a tool call.
    ///
    /// The workspace check runs first and may move the task to another
    /// workspace. On a pause the task is marked [`TaskStatus::Paused`].
    pub fn check_tool_call(
        &self,
        task: &mut Task,
        workspace: &mut Workspace,
        needs_shell: bool,
    ) -> ToolDispatch {
        task.flags.requires_execution_tool_run = needs_shell;

        match self.gate.check_tool_call(task, workspace) {
            GateVerdict::Pass => ToolDispatch::Proceed,
            GateVerdict::Pause(reason) => {
                task.status = TaskStatus::Paused;
                ToolDispatch::Halt(reason)
            }
        }
    }

    /// Apply the user's answer to a paused task, if there is one.
    ///
    /// Returns `Ok(None)` while the prompt is unanswered. A `Cancel` answer
    /// also cancels the task in the scheduler.
    pub fn resume(
        &self,
        task: &mut Task,
        workspace: &mut Workspace,
    ) -> Result<Option<Resolution>, PromptError> {
        let Some((reason, choice)) = self.prompts.take_response(&task.id) else {
            return Ok(None);
        };
        let resolution = PromptBoard::apply_choice(task, workspace, reason, choice)?;
        match resolution {
            Resolution::Resume => {
                info!(task_id = %task.id, %reason, %choice, "Task resumed");
                task.status = TaskStatus::Running;
            }
            Resolution::Cancel => {
                self.scheduler.cancel(&task.id);
                task.status = TaskStatus::Cancelled;
            }
        }
        Ok(Some(resolution))
    }

    /// Compact the conversation ahead of an LLM call.
    pub fn prepare_turn<'a>(
        &self,
        messages: &'a [Message],
        reserved_output_tokens: usize,
    ) -> CompactionResult<'a> {
        self.compactor
            .compact_messages_with_meta(messages, reserved_output_tokens)
    }

    /// Report a task as done and release its slot.
    pub fn finish(&self, task_id: &TaskId) {
        self.prompts.dismiss(task_id);
        self.scheduler.on_task_finished(task_id);
    }

    /// Cancel a task wherever it is. Returns `false` if the scheduler did not
    /// know it.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        self.prompts.dismiss(task_id);
        let known = self.scheduler.cancel(task_id);
        debug!(%task_id, known, "Cancel requested");
        known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::WorkspaceNeed;
    use crate::gate::test_support::{FixedClassifier, MapSignals, PROJECT};
    use crate::prompt::PromptChoice;
    use crate::scheduler::test_support::RecordingRunner;

    fn orchestrator(need: WorkspaceNeed, max: usize) -> (Orchestrator, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner::default());
        let prompts = Arc::new(PromptBoard::new());
        let gate = PreflightGate::new(
            Arc::new(FixedClassifier {
                need,
                internal: false,
            }),
            Arc::new(MapSignals::default().with("/code/app", PROJECT)),
            prompts.clone(),
        );
        let scheduler = TaskScheduler::new(
            SchedulerSettings::default()
                .with_max_concurrent_tasks(max)
                .with_task_timeout_minutes(0),
            runner.clone(),
        );
        let compactor = ContextCompactor::with_context_window(100_000, CompactorConfig::default());
        (
            Orchestrator::new(scheduler, gate, compactor, prompts),
            runner,
        )
    }

    fn task(id: &str) -> Task {
        Task::new(TaskId::new(id).unwrap(), "ws", "do the thing")
    }

    #[test]
    fn submit_sets_status_from_admission() {
        let (orch, _) = orchestrator(WorkspaceNeed::None, 1);
        let mut a = task("a");
        let mut b = task("b");
        assert_eq!(orch.submit(&mut a), Admission::StartImmediately);
        assert_eq!(a.status, TaskStatus::Running);
        assert_eq!(orch.submit(&mut b), Admission::Queue);
        assert_eq!(b.status, TaskStatus::Queued);
    }

    #[test]
    fn finish_promotes_queued_task() {
        let (orch, runner) = orchestrator(WorkspaceNeed::None, 1);
        let mut a = task("a");
        let mut b = task("b");
        orch.submit(&mut a);
        orch.submit(&mut b);
        orch.finish(&a.id);
        assert_eq!(runner.started(), vec!["b"]);
        assert!(orch.scheduler().is_running(&b.id));
    }

    #[test]
    fn shell_pause_then_continue_without_shell() {
        let (orch, _) = orchestrator(WorkspaceNeed::None, 5);
        let mut t = task("a");
        let mut ws = Workspace::project("ws", "/code/app");
        orch.submit(&mut t);

        assert_eq!(
            orch.check_tool_call(&mut t, &mut ws, true),
            ToolDispatch::Halt(PauseReason::ShellPermissionRequired)
        );
        assert_eq!(t.status, TaskStatus::Paused);
        assert_eq!(orch.resume(&mut t, &mut ws).unwrap(), None);

        orch.prompts()
            .respond(&t.id, PromptChoice::ContinueWithoutShell)
            .unwrap();
        assert_eq!(orch.resume(&mut t, &mut ws).unwrap(), Some(Resolution::Resume));
        assert_eq!(t.status, TaskStatus::Running);
        assert_eq!(orch.check_tool_call(&mut t, &mut ws, true), ToolDispatch::Proceed);
        assert!(orch.prompts().pending().is_empty());
    }

    #[test]
    fn non_shell_calls_proceed() {
        let (orch, _) = orchestrator(WorkspaceNeed::None, 5);
        let mut t = task("a");
        let mut ws = Workspace::project("ws", "/code/app");
        assert_eq!(orch.check_tool_call(&mut t, &mut ws, false), ToolDispatch::Proceed);
    }

    #[test]
    fn workspace_pause_takes_precedence_over_shell() {
        let (orch, _) = orchestrator(WorkspaceNeed::NeedsExisting, 5);
        let mut t = task("a");
        let mut ws = Workspace::temp("tmp", "/tmp/scratch");
        assert_eq!(
            orch.check_tool_call(&mut t, &mut ws, true),
            ToolDispatch::Halt(PauseReason::WorkspaceRequired)
        );
        assert_eq!(orch.prompts().pending().len(), 1);
    }

    #[test]
    fn cancel_answer_cancels_in_scheduler() {
        let (orch, _) = orchestrator(WorkspaceNeed::NeedsExisting, 5);
        let mut t = task("a");
        let mut ws = Workspace::temp("tmp", "/tmp/scratch");
        orch.submit(&mut t);
        orch.check_tool_call(&mut t, &mut ws, false);
        orch.prompts().respond(&t.id, PromptChoice::Cancel).unwrap();

        assert_eq!(orch.resume(&mut t, &mut ws).unwrap(), Some(Resolution::Cancel));
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert!(!orch.scheduler().is_running(&t.id));
    }

    #[test]
    fn cancel_dismisses_prompt() {
        let (orch, _) = orchestrator(WorkspaceNeed::NeedsExisting, 5);
        let mut t = task("a");
        let mut ws = Workspace::temp("tmp", "/tmp/scratch");
        orch.submit(&mut t);
        orch.check_tool_call(&mut t, &mut ws, false);
        assert!(orch.cancel(&t.id));
        assert!(orch.prompts().get(&t.id).is_none());
        assert!(!orch.cancel(&t.id));
    }

    #[test]
    fn prepare_turn_passes_small_conversations_through() {
        let (orch, _) = orchestrator(WorkspaceNeed::None, 5);
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        let result = orch.prepare_turn(&messages, 1_000);
        assert!(result.is_unchanged());
    }
}

//! End-to-end scenarios across scheduler, gate, switcher and compactor,
//! using only the public API.

use std::fs;
use std::sync::{Arc, Mutex};

use cadre::context::{CompactionKind, CompactorConfig, ContextCompactor};
use cadre::error::CollaboratorError;
use cadre::gate::{
    GateVerdict, PauseReason, PauseSink, PreflightGate, WorkspaceClassifier, WorkspaceNeed,
};
use cadre::orchestrator::{Orchestrator, ToolDispatch};
use cadre::prelude::*;
use cadre::signals::FsSignalProvider;
use cadre::switcher::DaemonEvent;
use cadre::task::WorkspaceId;

// ── Fakes ──────────────────────────────────────────────────────────

struct Classifier(WorkspaceNeed);

impl WorkspaceClassifier for Classifier {
    fn classify_workspace_need(&self, _task: &Task) -> WorkspaceNeed {
        self.0
    }

    fn is_internal_app_or_tool_change_intent(&self, _task: &Task) -> bool {
        false
    }
}

#[derive(Default)]
struct Pauses(Mutex<Vec<PauseReason>>);

impl PauseSink for Pauses {
    fn pause_for_user_input(&self, _task: &Task, reason: PauseReason) {
        self.0.lock().unwrap().push(reason);
    }
}

#[derive(Default)]
struct Runner(Mutex<Vec<TaskId>>);

impl TaskRunner for Runner {
    fn start_task(&self, task_id: &TaskId) {
        self.0.lock().unwrap().push(task_id.clone());
    }
}

struct FakeDaemon {
    candidate: Workspace,
    updates: Mutex<Vec<(TaskId, WorkspaceId)>>,
    events: Mutex<Vec<DaemonEvent>>,
}

impl Daemon for FakeDaemon {
    fn most_recent_non_temp_workspace(&self) -> Option<Workspace> {
        Some(self.candidate.clone())
    }

    fn update_task_workspace(
        &self,
        task_id: &TaskId,
        workspace_id: &WorkspaceId,
    ) -> Result<(), CollaboratorError> {
        self.updates
            .lock()
            .unwrap()
            .push((task_id.clone(), workspace_id.clone()));
        Ok(())
    }

    fn log_event(&self, event: &DaemonEvent) -> Result<(), CollaboratorError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeTools(Mutex<Option<WorkspaceId>>);

impl ToolRegistry for FakeTools {
    fn set_workspace(&self, workspace: &Workspace) -> Result<(), CollaboratorError> {
        *self.0.lock().unwrap() = Some(workspace.id.clone());
        Ok(())
    }
}

fn id(s: &str) -> TaskId {
    TaskId::new(s).unwrap()
}

fn gate(need: WorkspaceNeed) -> (PreflightGate, Arc<Pauses>) {
    let pauses = Arc::new(Pauses::default());
    let gate = PreflightGate::new(
        Arc::new(Classifier(need)),
        Arc::new(FsSignalProvider),
        pauses.clone(),
    );
    (gate, pauses)
}

fn project_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
    dir
}

// ── Compactor ──────────────────────────────────────────────────────

#[test]
fn short_conversation_is_left_alone() {
    let messages = vec![
        Message::user("short task context"),
        Message::assistant("short response"),
    ];
    let compactor =
        ContextCompactor::for_model("anthropic/claude-sonnet-4", CompactorConfig::default());
    let result = compactor.compact_messages_with_meta(&messages, 8_192);

    assert_eq!(result.meta.kind, CompactionKind::None);
    assert!(!result.meta.removed_messages.did_remove);
    assert_eq!(result.messages.as_ref(), messages.as_slice());
    assert!(result.is_unchanged());
}

#[test]
fn long_conversation_drops_filler_but_keeps_anchor_and_recall() {
    let recall = "<memory_recall>user prefers small commits</memory_recall>";
    let mut messages = vec![Message::user("task context"), Message::user(recall)];
    for i in 0..40 {
        let filler = "x".repeat(2000);
        messages.push(if i % 2 == 0 {
            Message::user(filler)
        } else {
            Message::assistant(filler)
        });
    }

    let compactor = ContextCompactor::with_context_window(8_000, CompactorConfig::default());
    let result = compactor.compact_messages_with_meta(&messages, 1_000);

    assert_eq!(result.meta.kind, CompactionKind::MessageRemoval);
    assert!(result.meta.removed_messages.count > 0);
    assert_eq!(result.messages[0].content, "task context");
    assert!(result.messages.iter().any(|m| m.content == recall));
    assert!(
        result
            .meta
            .removed_messages
            .messages
            .iter()
            .all(|m| !m.content.contains("<memory_recall>"))
    );
    assert_eq!(
        result.messages.len() + result.meta.removed_messages.count,
        messages.len()
    );
}

// ── Scheduler ──────────────────────────────────────────────────────

#[test]
fn sub_agents_of_a_saturated_parent_never_queue() {
    let runner = Arc::new(Runner::default());
    let orch = Orchestrator::new(
        TaskScheduler::new(
            SchedulerSettings::default()
                .with_max_concurrent_tasks(5)
                .with_task_timeout_minutes(0),
            runner.clone(),
        ),
        gate(WorkspaceNeed::None).0,
        ContextCompactor::with_context_window(128_000, CompactorConfig::default()),
        Arc::new(PromptBoard::new()),
    );

    let mut mains: Vec<Task> = (0..5)
        .map(|i| Task::new(id(&format!("main-{i}")), "ws", "work"))
        .collect();
    for task in &mut mains {
        assert_eq!(orch.submit(task), Admission::StartImmediately);
    }

    for i in 0..3 {
        let mut sub = Task::new(id(&format!("sub-{i}")), "ws", "help")
            .with_parent(mains[0].id.clone());
        assert_eq!(orch.submit(&mut sub), Admission::StartImmediately);
        assert_eq!(sub.status, TaskStatus::Running);
    }
    assert_eq!(orch.scheduler().status().running_count, 8);

    let mut late = Task::new(id("late"), "ws", "more work");
    assert_eq!(orch.submit(&mut late), Admission::Queue);
    assert_eq!(late.status, TaskStatus::Queued);

    // 8 running: the queued task waits until running drops below 5.
    orch.finish(&mains[1].id);
    orch.finish(&id("sub-0"));
    orch.finish(&id("sub-1"));
    assert!(runner.0.lock().unwrap().is_empty());
    orch.finish(&id("sub-2"));
    assert_eq!(*runner.0.lock().unwrap(), vec![id("late")]);
    assert!(orch.scheduler().is_running(&id("late")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_respect_the_limit() {
    let runner = Arc::new(Runner::default());
    let scheduler = TaskScheduler::new(
        SchedulerSettings::default().with_max_concurrent_tasks(4),
        runner,
    );

    let handles = (0..32).map(|i| {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let task = Task::new(id(&format!("t-{i}")), "ws", "work");
            scheduler.enqueue(&task)
        })
    });
    let admissions: Vec<Admission> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let started = admissions
        .iter()
        .filter(|a| **a == Admission::StartImmediately)
        .count();
    assert_eq!(started, 4);
    let status = scheduler.status();
    assert_eq!(status.running_count, 4);
    assert_eq!(status.queued_count, 28);
    assert_eq!(scheduler.armed_watchdogs(), 4);
}

// ── Gate ───────────────────────────────────────────────────────────

#[test]
fn acknowledged_task_never_pauses_on_workspace() {
    for need in [
        WorkspaceNeed::NeedsExisting,
        WorkspaceNeed::Ambiguous,
        WorkspaceNeed::None,
    ] {
        let (gate, pauses) = gate(need);
        let mut task = Task::new(id("t"), "tmp", "fix it").with_flags(GateFlags {
            workspace_preflight_acknowledged: true,
            requires_execution_tool_run: true,
            ..GateFlags::default()
        });
        let mut ws = Workspace::temp("tmp", "/nonexistent/scratch");
        assert!(!gate.preflight_workspace_check(&mut task, &mut ws));
        assert!(pauses.0.lock().unwrap().is_empty());
    }
}

#[test]
fn needs_existing_in_temp_requires_workspace() {
    let (gate, pauses) = gate(WorkspaceNeed::NeedsExisting);
    let mut task = Task::new(id("t"), "tmp", "fix the build in my repo");
    let mut ws = Workspace::temp("tmp", "/nonexistent/scratch");
    assert!(gate.preflight_workspace_check(&mut task, &mut ws));
    assert_eq!(*pauses.0.lock().unwrap(), vec![PauseReason::WorkspaceRequired]);
}

#[test]
fn needs_existing_in_empty_directory_is_a_mismatch() {
    let empty = tempfile::tempdir().unwrap();
    let (gate, _) = gate(WorkspaceNeed::NeedsExisting);
    let mut task = Task::new(id("t"), "ws", "fix the build in my repo");
    let mut ws = Workspace::project("ws", empty.path());
    assert_eq!(
        gate.check_workspace(&mut task, &mut ws),
        GateVerdict::Pause(PauseReason::WorkspaceMismatch)
    );

    let project = project_dir();
    let mut ws = Workspace::project("ws", project.path());
    assert_eq!(gate.check_workspace(&mut task, &mut ws), GateVerdict::Pass);
}

#[test]
fn shell_opt_out_flips_the_shell_check() {
    let (gate, pauses) = gate(WorkspaceNeed::None);
    let mut task = Task::new(id("t"), "ws", "run the tests").with_flags(GateFlags {
        requires_execution_tool_run: true,
        ..GateFlags::default()
    });
    let ws = Workspace::project("ws", "/code/app");

    assert!(gate.preflight_shell_execution_check(&task, &ws));
    assert_eq!(
        *pauses.0.lock().unwrap(),
        vec![PauseReason::ShellPermissionRequired]
    );

    task.flags.allow_execution_without_shell = true;
    assert!(!gate.preflight_shell_execution_check(&task, &ws));
    assert!(!gate.preflight_shell_execution_check(&task, &ws.clone().with_shell(true)));
}

#[test]
fn acknowledged_pause_does_not_fire_again() {
    let prompts = Arc::new(PromptBoard::new());
    let orch = Orchestrator::new(
        TaskScheduler::new(SchedulerSettings::default(), Arc::new(Runner::default())),
        PreflightGate::new(
            Arc::new(Classifier(WorkspaceNeed::NeedsExisting)),
            Arc::new(FsSignalProvider),
            prompts.clone(),
        ),
        ContextCompactor::with_context_window(128_000, CompactorConfig::default()),
        prompts,
    );
    let mut task = Task::new(id("t"), "tmp", "fix the build in my repo");
    let mut ws = Workspace::temp("tmp", "/nonexistent/scratch").with_shell(true);
    orch.submit(&mut task);

    assert_eq!(
        orch.check_tool_call(&mut task, &mut ws, false),
        ToolDispatch::Halt(PauseReason::WorkspaceRequired)
    );
    let prompt = orch.prompts().get(&task.id).unwrap();
    assert_eq!(prompt.choices, vec![PromptChoice::Continue, PromptChoice::Cancel]);

    orch.prompts()
        .respond(&task.id, PromptChoice::Continue)
        .unwrap();
    assert_eq!(
        orch.resume(&mut task, &mut ws).unwrap(),
        Some(Resolution::Resume)
    );
    assert!(task.flags.workspace_preflight_acknowledged);

    for _ in 0..3 {
        assert_eq!(
            orch.check_tool_call(&mut task, &mut ws, true),
            ToolDispatch::Proceed
        );
    }
    assert!(orch.prompts().pending().is_empty());
}

// ── Auto-switch ────────────────────────────────────────────────────

#[test]
fn ambiguous_task_in_temp_moves_to_recent_project() {
    let project = project_dir();
    let candidate = Workspace::project("proj", project.path());
    let daemon = Arc::new(FakeDaemon {
        candidate: candidate.clone(),
        updates: Mutex::default(),
        events: Mutex::default(),
    });
    let tools = Arc::new(FakeTools::default());
    let switcher = Arc::new(WorkspaceAutoSwitcher::new(
        daemon.clone(),
        tools.clone(),
        Arc::new(FsSignalProvider),
    ));
    let (gate, pauses) = gate(WorkspaceNeed::Ambiguous);
    let gate = gate.with_auto_switcher(switcher);

    let mut task = Task::new(id("t"), "tmp", "tidy things up");
    let mut ws = Workspace::temp("tmp", "/nonexistent/scratch");
    assert!(!gate.preflight_workspace_check(&mut task, &mut ws));

    assert_eq!(task.workspace_id, candidate.id);
    assert_eq!(ws, candidate);
    assert_eq!(*tools.0.lock().unwrap(), Some(candidate.id.clone()));
    assert_eq!(
        *daemon.updates.lock().unwrap(),
        vec![(id("t"), WorkspaceId::new("proj"))]
    );
    let events = daemon.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "workspace_auto_switched");
    assert_eq!(events[0].payload["from_workspace_id"], "tmp");
    assert!(pauses.0.lock().unwrap().is_empty());
}

#[test]
fn ambiguous_task_stays_put_when_candidate_is_not_a_project() {
    let empty = tempfile::tempdir().unwrap();
    let daemon = Arc::new(FakeDaemon {
        candidate: Workspace::project("proj", empty.path()),
        updates: Mutex::default(),
        events: Mutex::default(),
    });
    let tools = Arc::new(FakeTools::default());
    let switcher = Arc::new(WorkspaceAutoSwitcher::new(
        daemon.clone(),
        tools.clone(),
        Arc::new(FsSignalProvider),
    ));
    let (gate, pauses) = gate(WorkspaceNeed::Ambiguous);
    let gate = gate.with_auto_switcher(switcher);

    let mut task = Task::new(id("t"), "tmp", "tidy things up");
    let mut ws = Workspace::temp("tmp", "/nonexistent/scratch");
    let before = (task.clone(), ws.clone());
    assert!(!gate.preflight_workspace_check(&mut task, &mut ws));

    assert_eq!((task, ws), before);
    assert!(tools.0.lock().unwrap().is_none());
    assert!(daemon.updates.lock().unwrap().is_empty());
    assert!(daemon.events.lock().unwrap().is_empty());
    assert!(pauses.0.lock().unwrap().is_empty());
}

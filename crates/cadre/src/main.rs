//! Exercise the orchestration core offline.
//!
//! # Examples
//!
//! ```sh
//! # Compact a conversation for a model and print the result as JSON
//! cadre compact --input conv.json --model anthropic/claude-sonnet-4 --reserved-output 4096
//!
//! # Run both preflight checks for a task record
//! cadre preflight --task task.json --workspace ws.json --shell
//!
//! # Replay the parent/sub-agent saturation scenario
//! cadre simulate --max-concurrent 5 --main-tasks 5 --sub-agents 3
//!
//! # Any command, with the captured activity log on stderr
//! cadre --verbose simulate
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use cadre::Message;
use cadre::config::SchedulerSettings;
use cadre::context::{CompactorConfig, ContextCompactor};
use cadre::events::LoggingHandler;
use cadre::gate::{GateVerdict, PreflightGate};
use cadre::prompt::PromptBoard;
use cadre::scheduler::{TaskRunner, TaskScheduler};
use cadre::task::{Task, TaskId, Workspace};
use cadre::telemetry::ActivityLayer;
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Agent task orchestration core: preflight gating, scheduling and context
/// compaction.
#[derive(Parser)]
#[command(name = "cadre")]
struct Cli {
    /// Dump the captured activity log to stderr when done
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compact a conversation (JSON array of messages) to fit a model
    Compact(CompactArgs),
    /// Run the workspace and shell preflight checks for a task
    Preflight(PreflightArgs),
    /// Saturate the scheduler, spawn sub-agents, and print the queue
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct CompactArgs {
    /// Path to a JSON array of `{role, content}` messages
    #[arg(long)]
    input: PathBuf,

    /// Model whose context window to use
    #[arg(long, default_value = "anthropic/claude-sonnet-4")]
    model: String,

    /// Explicit context window, overriding the model lookup
    #[arg(long)]
    context_window: Option<usize>,

    /// Tokens reserved for the model's response
    #[arg(long, default_value_t = 4096)]
    reserved_output: usize,

    /// Tokens held back on top of the reserved output
    #[arg(long)]
    safety_margin: Option<usize>,
}

#[derive(Args)]
struct PreflightArgs {
    /// Path to a task record (JSON)
    #[arg(long)]
    task: PathBuf,

    /// Path to a workspace record (JSON)
    #[arg(long)]
    workspace: PathBuf,

    /// The tool call about to run is a shell / execution tool
    #[arg(long)]
    shell: bool,
}

#[derive(Args)]
struct SimulateArgs {
    /// Concurrency limit for main tasks (overrides --settings)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Main tasks submitted up front
    #[arg(long, default_value_t = 5)]
    main_tasks: usize,

    /// Sub-agents spawned by the first main task
    #[arg(long, default_value_t = 3)]
    sub_agents: usize,

    /// Scheduler settings file (JSON)
    #[arg(long)]
    settings: Option<PathBuf>,
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {what} file '{}': {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse {what} file '{}': {e}", path.display()))
}

fn to_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize output: {e}"))
}

fn verdict_json(verdict: GateVerdict) -> serde_json::Value {
    serde_json::json!({
        "paused": verdict.is_pause(),
        "reason": verdict.reason().map(|r| r.as_str()),
    })
}

/// Runner that only logs what the scheduler asks of it.
struct LogRunner;

impl TaskRunner for LogRunner {
    fn start_task(&self, task_id: &TaskId) {
        info!(%task_id, "Runner asked to start task");
    }
}

fn task_id(id: String) -> Result<TaskId, String> {
    TaskId::new(id).map_err(|e| e.to_string())
}

// ── Commands ───────────────────────────────────────────────────────

fn compact(args: &CompactArgs) -> Result<String, String> {
    let messages: Vec<Message> = read_json(&args.input, "conversation")?;

    let mut config = CompactorConfig::default();
    if let Some(margin) = args.safety_margin {
        config = config.with_safety_margin(margin);
    }
    let compactor = match args.context_window {
        Some(window) => ContextCompactor::with_context_window(window, config),
        None => ContextCompactor::for_model(&args.model, config),
    };

    let result = compactor.compact_messages_with_meta(&messages, args.reserved_output);
    to_pretty(&result)
}

fn preflight(args: &PreflightArgs) -> Result<String, String> {
    let mut task: Task = read_json(&args.task, "task")?;
    let mut workspace: Workspace = read_json(&args.workspace, "workspace")?;
    if args.shell {
        task.flags.requires_execution_tool_run = true;
    }

    let prompts = Arc::new(PromptBoard::new());
    let gate = PreflightGate::heuristic(prompts.clone());
    let report = preflight_report(&gate, &mut task, &mut workspace);

    to_pretty(&serde_json::json!({
        "task_id": task.id,
        "workspace_id": task.workspace_id,
        "workspace": report["workspace"],
        "shell": report["shell"],
        "prompts": prompts.pending(),
    }))
}

/// Workspace verdict, then the shell verdict. The shell check is skipped
/// (reported as `null`) once the workspace check has paused the task.
fn preflight_report(
    gate: &PreflightGate,
    task: &mut Task,
    workspace: &mut Workspace,
) -> serde_json::Value {
    let workspace_verdict = gate.check_workspace(task, workspace);
    let shell = if workspace_verdict.is_pause() {
        serde_json::Value::Null
    } else {
        verdict_json(gate.check_shell(task, workspace))
    };
    serde_json::json!({
        "workspace": verdict_json(workspace_verdict),
        "shell": shell,
    })
}

fn simulate(args: &SimulateArgs) -> Result<String, String> {
    let mut settings = match &args.settings {
        Some(path) => SchedulerSettings::from_path(path).map_err(|e| e.to_string())?,
        None => SchedulerSettings::default(),
    };
    if let Some(max) = args.max_concurrent {
        settings = settings.with_max_concurrent_tasks(max);
    }

    let scheduler =
        TaskScheduler::with_events(settings, Arc::new(LogRunner), Arc::new(LoggingHandler));
    let mut lines = Vec::new();

    let mut parent = None;
    for i in 1..=args.main_tasks {
        let task = Task::new(task_id(format!("main-{i}"))?, "ws", "main task");
        let admission = scheduler.enqueue(&task);
        lines.push(format!("{:<12} {admission}", task.id.as_str()));
        parent.get_or_insert(task.id);
    }

    if let Some(parent) = parent {
        for i in 1..=args.sub_agents {
            let task = Task::new(task_id(format!("sub-{i}"))?, "ws", "sub-agent")
                .with_parent(parent.clone());
            let admission = scheduler.enqueue(&task);
            lines.push(format!("{:<12} {admission} (parent {parent})", task.id.as_str()));
        }
    }

    let late = Task::new(task_id("main-late".into())?, "ws", "late main task");
    let admission = scheduler.enqueue(&late);
    lines.push(format!("{:<12} {admission}", late.id.as_str()));

    let status = scheduler.status();
    lines.push(String::new());
    lines.push(status.to_log_string());
    lines.push(to_pretty(&status)?);
    Ok(lines.join("\n"))
}

fn run(cli: &Cli) -> Result<String, String> {
    match &cli.command {
        Command::Compact(args) => compact(args),
        Command::Preflight(args) => preflight(args),
        Command::Simulate(args) => simulate(args),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (layer, log) = ActivityLayer::new();
    tracing_subscriber::registry().with(layer).init();

    let result = run(&cli);

    if cli.verbose {
        for line in log.drain() {
            eprintln!("{line}");
        }
    }

    match result {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

//! Keyword heuristics over a task's title and prompt.
//!
//! These back the default [`HeuristicClassifier`]. Hosts with a model-based
//! classifier implement [`WorkspaceClassifier`] themselves.

use std::path::Path;

use super::{WorkspaceClassifier, WorkspaceNeed};
use crate::signals::is_code_file;
use crate::task::Task;

/// Phrases that mean the action targets the agent app or its own tooling.
const INTERNAL_APP_PHRASES: &[&str] = &[
    "your settings",
    "your own",
    "yourself",
    "your tools",
    "your skills",
    "your memory",
    "your configuration",
    "your config",
    "your system prompt",
    "app settings",
    "agent settings",
    "api key",
    "mcp server",
    "integration",
    "install a skill",
    "add a tool",
    "new tool for you",
    "connect discord",
    "connect slack",
    "connect telegram",
    "connect whatsapp",
];

/// Phrases that refer to a project that already exists somewhere.
const EXISTING_PROJECT_PHRASES: &[&str] = &[
    "my project",
    "our project",
    "this project",
    "the project",
    "my repo",
    "this repo",
    "the repo",
    "repository",
    "codebase",
    "code base",
    "existing",
    "failing test",
    "the tests",
    "the build",
    "pull request",
    "merge conflict",
    "git branch",
    "commit ",
    "refactor",
    "in src/",
];

/// Words that suggest the task will produce or touch files, without saying
/// where.
const WORKSPACE_ACTION_WORDS: &[&str] = &[
    "build",
    "create",
    "implement",
    "scaffold",
    "generate",
    "write a script",
    "write code",
    "script",
    "file",
    "folder",
    "directory",
    "install",
    "compile",
    "deploy",
    "website",
    "app",
    "program",
    "fix",
    "debug",
];

/// File stems that name a source file even without a directory part.
const SOURCE_FILE_STEMS: &[&str] = &[
    "main", "lib", "mod", "app", "setup", "server", "client", "utils", "util", "helpers",
    "config", "manage", "conftest", "__init__", "__main__",
];

/// Whether the task changes the agent app or its tools rather than project
/// files.
pub fn is_internal_app_or_tool_change_intent(task: &Task) -> bool {
    let text = task.intent_text();
    INTERNAL_APP_PHRASES.iter().any(|p| text.contains(p))
}

/// Keyword classification of what kind of workspace the task needs.
pub fn classify_workspace_need(task: &Task) -> WorkspaceNeed {
    let text = task.intent_text();
    if EXISTING_PROJECT_PHRASES.iter().any(|p| text.contains(p)) || mentions_source_path(&text) {
        WorkspaceNeed::NeedsExisting
    } else if text
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| WORKSPACE_ACTION_WORDS.contains(&word))
        || WORKSPACE_ACTION_WORDS
            .iter()
            .filter(|p| p.contains(' '))
            .any(|p| text.contains(p))
    {
        WorkspaceNeed::Ambiguous
    } else {
        WorkspaceNeed::None
    }
}

/// Whether any whitespace-separated token looks like a source file path
/// (`src/lib.rs`, `main.py`).
///
/// A bare file name only counts when its stem is a common source file name,
/// so product names like `node.js` in prose do not.
fn mentions_source_path(text: &str) -> bool {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| "`'\"(),:;!?".contains(c)))
        .map(|token| token.trim_end_matches('.'))
        .any(looks_like_source_path)
}

fn looks_like_source_path(token: &str) -> bool {
    let path = Path::new(token);
    if token.is_empty() || !is_code_file(path) {
        return false;
    }
    if token.contains('/') || token.contains('\\') {
        return true;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| SOURCE_FILE_STEMS.contains(&stem))
}

/// Keyword-based [`WorkspaceClassifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl WorkspaceClassifier for HeuristicClassifier {
    fn classify_workspace_need(&self, task: &Task) -> WorkspaceNeed {
        classify_workspace_need(task)
    }

    fn is_internal_app_or_tool_change_intent(&self, task: &Task) -> bool {
        is_internal_app_or_tool_change_intent(task)
    }
}

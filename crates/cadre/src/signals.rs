//! Workspace signal lookup.
//!
//! Signals are cheap filesystem evidence that a directory is a real project:
//! build/VCS markers, source files and conventional app directories. They
//! drive two decisions: whether an auto-switch candidate is suitable, and
//! whether a non-temp workspace matches a task that needs an existing
//! project.
//!
//! A failed lookup returns `None`. Callers treat that as insufficient
//! evidence, never as an error.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::task::Workspace;

/// Files or directories whose presence marks a project root.
pub const PROJECT_MARKERS: &[&str] = &[
    ".git",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "Gemfile",
    "composer.json",
    "mix.exs",
    "Package.swift",
    "CMakeLists.txt",
    "Makefile",
    "deno.json",
];

/// Conventional directories that hold application code.
pub const APP_DIRS: &[&str] = &[
    "src",
    "app",
    "lib",
    "pages",
    "components",
    "cmd",
    "pkg",
    "packages",
    "crates",
    "server",
    "client",
];

/// File extensions counted as source code.
pub const CODE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "swift", "rb", "php",
    "c", "h", "cc", "cpp", "hpp", "cs", "scala", "vue", "svelte", "html", "css", "scss", "sql",
    "sh", "lua", "dart", "ex", "exs", "zig",
];

/// Upper bound on directory entries inspected per lookup.
const MAX_ENTRIES_SCANNED: usize = 512;

/// Evidence gathered for one workspace directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSignals {
    pub has_project_markers: bool,
    pub has_code_files: bool,
    pub has_app_dirs: bool,
}

impl WorkspaceSignals {
    /// Strong enough evidence that the directory is a project: a marker
    /// file, or source files together with an app directory.
    pub fn looks_like_project(&self) -> bool {
        self.has_project_markers || (self.has_code_files && self.has_app_dirs)
    }
}

/// Source of [`WorkspaceSignals`].
pub trait SignalProvider: Send + Sync {
    /// Signals for a directory, or `None` if the lookup failed.
    fn signals_for_path(&self, path: &Path) -> Option<WorkspaceSignals>;

    fn signals_for_workspace(&self, workspace: &Workspace) -> Option<WorkspaceSignals> {
        self.signals_for_path(&workspace.path)
    }
}

/// Returns `true` if `path` has a recognised source-code extension.
pub fn is_code_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CODE_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext)))
}

/// Inspects the filesystem: the workspace root, plus one level into each
/// app directory when looking for code files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSignalProvider;

impl SignalProvider for FsSignalProvider {
    fn signals_for_path(&self, path: &Path) -> Option<WorkspaceSignals> {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %path.display(), "Workspace signal lookup failed: {e}");
                return None;
            }
        };

        let mut signals = WorkspaceSignals::default();
        let mut app_dirs = Vec::new();
        let mut scanned = 0usize;

        for entry in entries.flatten() {
            scanned += 1;
            if scanned > MAX_ENTRIES_SCANNED {
                break;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

            if PROJECT_MARKERS.contains(&&*name) {
                signals.has_project_markers = true;
            }
            if is_dir && APP_DIRS.contains(&&*name) {
                signals.has_app_dirs = true;
                app_dirs.push(entry.path());
            } else if !is_dir && is_code_file(Path::new(&*name)) {
                signals.has_code_files = true;
            }
        }

        if !signals.has_code_files {
            'outer: for dir in &app_dirs {
                let Ok(entries) = fs::read_dir(dir) else {
                    continue;
                };
                for entry in entries.flatten() {
                    scanned += 1;
                    if scanned > MAX_ENTRIES_SCANNED {
                        break 'outer;
                    }
                    if is_code_file(&entry.path()) {
                        signals.has_code_files = true;
                        break 'outer;
                    }
                }
            }
        }

        debug!(path = %path.display(), ?signals, "Workspace signals");
        Some(signals)
    }
}

//! Scheduler settings supplied by the host's settings store.
//!
//! ```ignore
//! // Lenient: missing file → defaults, unparseable file → warn + defaults.
//! let settings = SchedulerSettings::load("settings.json");
//!
//! // Strict: surface the error to the caller.
//! let settings = SchedulerSettings::from_path("settings.json")?;
//!
//! let settings = SchedulerSettings::default()
//!     .with_max_concurrent_tasks(3)
//!     .with_task_timeout_minutes(0); // no watchdog
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Default number of main tasks allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 5;

/// Upper bound on the configurable concurrency limit.
pub const MAX_CONCURRENT_TASKS_CAP: usize = 20;

/// Default per-task watchdog duration.
pub const DEFAULT_TASK_TIMEOUT_MINUTES: u64 = 30;

/// Concurrency limit and watchdog duration for the
/// [`TaskScheduler`](crate::scheduler::TaskScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Main tasks allowed to run at once. Clamped to `1..=20` when read.
    #[serde(alias = "maxConcurrentTasks")]
    pub max_concurrent_tasks: usize,
    /// Minutes before a running task is force-finished. `0` disables the
    /// watchdog.
    #[serde(alias = "taskTimeoutMinutes")]
    pub task_timeout_minutes: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            task_timeout_minutes: DEFAULT_TASK_TIMEOUT_MINUTES,
        }
    }
}

impl SchedulerSettings {
    pub fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    pub fn with_task_timeout_minutes(mut self, minutes: u64) -> Self {
        self.task_timeout_minutes = minutes;
        self
    }

    /// The effective concurrency limit.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent_tasks.clamp(1, MAX_CONCURRENT_TASKS_CAP)
    }

    /// The watchdog duration, or `None` when disabled.
    pub fn task_timeout(&self) -> Option<Duration> {
        match self.task_timeout_minutes {
            0 => None,
            m => Some(Duration::from_secs(m.saturating_mul(60))),
        }
    }

    /// Load settings from a JSON file. Returns defaults if the file doesn't
    /// exist or can't be parsed.
    pub fn load(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Failed to parse scheduler settings: {e}");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Load settings from a JSON file, failing on any I/O or parse error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

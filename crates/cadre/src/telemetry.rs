//! Tracing subscriber layer that captures log events into an
//! [`ActivityLog`] for later draining by a host frontend.
//!
//! The log has its own mutex, separate from any scheduler or prompt state,
//! so a `tracing` call from inside the scheduler never contends with a
//! frontend reading the log.
//!
//! ```ignore
//! let (layer, log) = ActivityLayer::new();
//! tracing_subscriber::registry().with(layer).init();
//! // ...
//! for line in log.drain() {
//!     println!("{} {} {}", line.time, line.level.label(), line.message);
//! }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::Serialize;
use tracing::Subscriber;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::registry::LookupSpan;

/// Maximum lines held before the log is trimmed.
pub const MAX_ACTIVITY_LINES: usize = 2000;
/// Trim to this many when the cap is exceeded.
pub const ACTIVITY_TRIM_TO: usize = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl ActivityLevel {
    /// Short fixed-width label for display.
    pub fn label(self) -> &'static str {
        match self {
            ActivityLevel::Trace => "TRACE",
            ActivityLevel::Debug => "DEBUG",
            ActivityLevel::Info => "INFO ",
            ActivityLevel::Warn => "WARN ",
            ActivityLevel::Error => "ERROR",
        }
    }
}

impl From<tracing::Level> for ActivityLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => ActivityLevel::Trace,
            tracing::Level::DEBUG => ActivityLevel::Debug,
            tracing::Level::INFO => ActivityLevel::Info,
            tracing::Level::WARN => ActivityLevel::Warn,
            tracing::Level::ERROR => ActivityLevel::Error,
        }
    }
}

/// One captured log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityLine {
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
    pub level: ActivityLevel,
    /// The event message followed by its fields, `message {k=v, ...}`.
    pub message: String,
}

impl fmt::Display for ActivityLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.time, self.level.label(), self.message)
    }
}

/// Shared, bounded buffer of captured lines.
#[derive(Clone, Default)]
pub struct ActivityLog(Arc<Mutex<Vec<ActivityLine>>>);

impl ActivityLog {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::with_capacity(128))))
    }

    /// Remove and return everything captured so far.
    pub fn drain(&self) -> Vec<ActivityLine> {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }

    /// Copy of the current contents, leaving them in place.
    pub fn snapshot(&self) -> Vec<ActivityLine> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, line: ActivityLine) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.push(line);
        if buf.len() > MAX_ACTIVITY_LINES {
            let trim_to = buf.len() - ACTIVITY_TRIM_TO;
            buf.drain(..trim_to);
        }
    }
}

/// A [`tracing_subscriber::Layer`] that records every event into an
/// [`ActivityLog`].
pub struct ActivityLayer {
    log: ActivityLog,
}

impl ActivityLayer {
    /// Create the layer and the log it writes to.
    pub fn new() -> (Self, ActivityLog) {
        let log = ActivityLog::new();
        (Self { log: log.clone() }, log)
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for ActivityLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut message = visitor.message;
        if !visitor.fields.is_empty() {
            let extras: Vec<String> = visitor
                .fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            if message.is_empty() {
                message = extras.join(" ");
            } else {
                message = format!("{message} {{{}}}", extras.join(", "));
            }
        }

        self.log.push(ActivityLine {
            time: Local::now().format("%H:%M:%S").to_string(),
            level: (*event.metadata().level()).into(),
            message,
        });
    }
}

/// Visitor that extracts the message and extra fields from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let raw = format!("{value:?}");
            if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
                #[allow(clippy::string_slice)] // stripping 1-byte ASCII quote chars
                {
                    self.message = raw[1..raw.len() - 1].to_string();
                }
            } else {
                self.message = raw;
            }
        } else {
            self.fields
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}

//! Error types.
//!
//! The gate and the compactor never fail; the scheduler is infallible for
//! well-formed [`TaskId`](crate::task::TaskId)s. Errors only surface at the
//! boundaries: identifier validation, collaborator calls during an
//! auto-switch, settings loading and prompt responses.

use std::path::PathBuf;

use thiserror::Error;

use crate::gate::PauseReason;
use crate::task::TaskId;

/// A task identifier failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("task id must not be empty")]
    Empty,
    #[error("task id must not contain whitespace: {0:?}")]
    Whitespace(String),
}

/// An external collaborator (daemon, tool registry) rejected a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{collaborator}: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// A step of the atomic workspace switch failed. Every variant means the
/// switch was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("tool registry refused the new workspace")]
    ToolRegistry(#[source] CollaboratorError),
    #[error("daemon failed to persist the task's workspace")]
    PersistTask(#[source] CollaboratorError),
    #[error("daemon failed to record the switch event")]
    LogEvent(#[source] CollaboratorError),
}

/// Settings could not be read or parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A response to a pause prompt was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("no pending prompt for task {0}")]
    NotPending(TaskId),
    #[error("choice '{choice}' is not offered for {reason}")]
    ChoiceNotOffered {
        reason: PauseReason,
        choice: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn switch_error_exposes_collaborator_source() {
        let err = SwitchError::PersistTask(CollaboratorError::new("daemon", "disk full"));
        assert_eq!(err.to_string(), "daemon failed to persist the task's workspace");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("daemon: disk full"));
    }

    #[test]
    fn prompt_error_messages() {
        let err = PromptError::ChoiceNotOffered {
            reason: PauseReason::WorkspaceRequired,
            choice: "enable_shell",
        };
        assert_eq!(
            err.to_string(),
            "choice 'enable_shell' is not offered for workspace_required"
        );
    }
}

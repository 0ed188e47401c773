//! Typed error hierarchy for gatekeeper.
//!
//! Two enums cover the two places a caller can see a failure:
//! - `ReviewError`: a review attempt could not produce a `TaskReview`
//! - `ConfigError`: `gatekeeper.toml` could not be read, parsed or written
//!
//! Everything else (diff failures, probe timeouts, reviewer output that
//! cannot be read) is folded into the review itself and never surfaces here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from a review attempt or the tracker wrapping it.
///
/// Payloads are plain strings so the error can be cloned and handed to every
/// caller waiting on the same in-flight review.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("Failed to start reviewer command: {reason}")]
    Command { reason: String },

    #[error("Project {project_id} not found")]
    ProjectNotFound { project_id: String },

    #[error("Task {task_id} not found in project {project_id}")]
    TaskNotFound { project_id: String, task_id: String },

    #[error("Reviews are disabled for project {project_id}")]
    ReviewsDisabled { project_id: String },

    #[error("A review of task {task_id} is already running")]
    AlreadyRunning { task_id: String },

    #[error("Review of task {task_id} ended without a result: {reason}")]
    Aborted { task_id: String, reason: String },
}

impl ReviewError {
    pub fn command(reason: impl Into<String>) -> Self {
        Self::Command {
            reason: reason.into(),
        }
    }

    /// Check if the reviewer process never started.
    pub fn is_command_error(&self) -> bool {
        matches!(self, Self::Command { .. })
    }
}

/// Errors from loading or saving `gatekeeper.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse gatekeeper.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize gatekeeper.toml: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to resolve project directory {path}: {source}")]
    ProjectDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

//! Unit-of-work types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a task in a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Not started, or sent back for another revision.
    #[default]
    Pending,
    /// An agent is working on it.
    InProgress,
    /// Needs a human before anything else happens.
    Blocked,
    /// Work is done and waiting for the reviewer agent.
    AwaitingReview,
    /// Approved by review.
    Complete,
    /// Deliberately not done.
    Skipped,
}

impl TaskStatus {
    /// Check if no further automatic work will happen on the task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Blocked => "blocked",
            Self::AwaitingReview => "awaiting-review",
            Self::Complete => "complete",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid task status '{0}'. Valid values: pending, in-progress, blocked, awaiting-review, complete, skipped")]
pub struct ParseStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "awaiting-review" => Ok(Self::AwaitingReview),
            "complete" | "completed" | "done" => Ok(Self::Complete),
            "skipped" => Ok(Self::Skipped),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// A discrete unit of work tracked by a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Identifiers of tasks that must finish first.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    /// Times the task has been sent back for rework.
    #[serde(default)]
    pub revision_count: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub acceptance: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl Task {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            status: TaskStatus::Pending,
            depends_on: BTreeSet::new(),
            revision_count: 0,
            scope: String::new(),
            acceptance: String::new(),
            notes: String::new(),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    pub fn with_acceptance(mut self, acceptance: &str) -> Self {
        self.acceptance = acceptance.to_string();
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    pub fn with_revision_count(mut self, count: u32) -> Self {
        self.revision_count = count;
        self
    }

    pub fn with_dependency(mut self, task_id: &str) -> Self {
        self.depends_on.insert(task_id.to_string());
        self
    }

    /// The attempt number the next review of this task will carry.
    pub fn next_attempt(&self) -> u32 {
        self.revision_count.saturating_add(1)
    }
}

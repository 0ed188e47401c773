//! Collaborator contracts consumed by the review pipeline.
//!
//! The pipeline never touches a terminal, git, the shell, the plan file or the
//! desktop directly. Each of those is a trait object handed in at construction
//! time. Real implementations live in [`crate::adapters`]; tests swap in fakes.

use anyhow::Result;
use async_trait::async_trait;
use gatekeeper_common::{Project, Task};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a session is being used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    #[default]
    Worker,
    Review,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker => write!(f, "worker"),
            Self::Review => write!(f, "review"),
        }
    }
}

/// Request to start an interactive agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub command: String,
    pub working_dir: PathBuf,
    pub model: Option<String>,
}

/// Result of a spawn request. Start failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOutcome {
    pub success: bool,
    pub session_id: Option<String>,
    pub error: Option<String>,
}

impl SpawnOutcome {
    pub fn started(session_id: impl Into<String>) -> Self {
        Self {
            success: true,
            session_id: Some(session_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: None,
            error: Some(error.into()),
        }
    }
}

/// Snapshot of a session known to the spawner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub project_id: String,
    pub command: String,
    pub role: SessionRole,
    /// Task the session is correlated with, if any.
    pub task_id: Option<String>,
}

/// Starts agent processes and reads what they say.
#[async_trait]
pub trait SessionSpawner: Send + Sync {
    async fn spawn(&self, project: &Project, options: SpawnOptions) -> SpawnOutcome;

    async fn session(&self, session_id: &str) -> Option<SessionInfo>;

    /// Set the role and task correlation on a session. Returns false if the
    /// session is unknown.
    async fn tag_session(&self, session_id: &str, role: SessionRole, task_id: &str) -> bool;

    async fn sessions_for_project(&self, project_id: &str) -> Vec<SessionInfo>;

    /// Deliver the review prompt to the session.
    async fn send_prompt(&self, session_id: &str, prompt: &str) -> Result<()>;

    /// Wait until the agent signals it is done and return everything it said.
    async fn await_output(&self, session_id: &str) -> Result<String>;
}

/// Retrieves code changes from version control.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    async fn diff(&self, path: &Path, staged_only: bool, base_branch: Option<&str>)
    -> Result<String>;
}

/// How a bounded shell command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    /// The command exited; `output` is stdout followed by stderr.
    Completed { output: String, success: bool },
    TimedOut { after: Duration },
    Failed { reason: String },
}

/// Runs a command string in a directory with a time limit.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run(&self, command: &str, working_dir: &Path, timeout: Duration) -> ShellOutcome;
}

/// Told whenever review changes a task's status.
#[async_trait]
pub trait PlanStatusSink: Send + Sync {
    /// Fire-and-forget; implementations log their own failures.
    async fn update_task_status(&self, project_id: &str, task: &Task);
}

/// Looks up projects and tasks by id.
#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn project(&self, project_id: &str) -> Option<Project>;

    async fn task(&self, project_id: &str, task_id: &str) -> Option<Task>;
}

/// Sound hint for a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSound {
    #[default]
    Default,
    /// Distinct sound for reviews that exhausted their retries.
    Failure,
}

impl NotificationSound {
    /// macOS system sound name.
    pub fn system_name(&self) -> &'static str {
        match self {
            Self::Default => "Glass",
            Self::Failure => "Basso",
        }
    }
}

/// A human-facing escalation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<NotificationSound>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            subtitle: None,
            sound: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_sound(mut self, sound: NotificationSound) -> Self {
        self.sound = Some(sound);
        self
    }
}

/// Delivers notifications to a human. Must never fail loudly.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the notification was delivered.
    async fn notify(&self, notification: &Notification) -> bool;
}

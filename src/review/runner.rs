//! Starting the reviewer agent.
//!
//! The runner formats the review prompt from a [`ReviewContext`], works out
//! which command to run, and asks the [`SessionSpawner`] for a session tagged
//! with the review role and the task id. A spawn failure is the one error a
//! review attempt propagates; see [`ReviewError::Command`].

use super::types::ReviewContext;
use crate::errors::ReviewError;
use crate::ports::{SessionRole, SessionSpawner, SpawnOptions};
use anyhow::Result;
use gatekeeper_common::{DEFAULT_REVIEW_COMMAND, Project};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reviewer command line and model after applying project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Full command line, model flag included.
    pub command: String,
    pub model: Option<String>,
}

/// Work out the reviewer command for a project.
///
/// Without review configuration (or with a blank command) this is
/// [`DEFAULT_REVIEW_COMMAND`]. A model override is appended as `--model`.
pub fn resolve_command(project: &Project) -> ResolvedCommand {
    let (base, model) = match &project.review {
        Some(review) => {
            let command = review.command.trim();
            let command = if command.is_empty() {
                DEFAULT_REVIEW_COMMAND
            } else {
                command
            };
            let model = review
                .model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string);
            (command.to_string(), model)
        }
        None => (DEFAULT_REVIEW_COMMAND.to_string(), None),
    };

    let command = match &model {
        Some(model) => format!("{} --model {}", base, model),
        None => base,
    };

    ResolvedCommand { command, model }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

/// Concatenate the non-empty context segments under their own headings, in
/// the order task, diff, tests, lint. An empty context gives an empty prompt.
pub fn format_prompt(context: &ReviewContext) -> String {
    let mut sections = Vec::new();

    if let Some(task) = non_empty(context.task_definition()) {
        sections.push(format!("## Task Definition\n\n{}", task.trim_end()));
    }
    if let Some(diff) = non_empty(context.git_diff()) {
        sections.push(format!("## Git Diff\n\n```diff\n{}\n```", diff.trim_end()));
    }
    if let Some(tests) = non_empty(context.test_output()) {
        sections.push(format!("## Test Results\n\n```\n{}\n```", tests.trim_end()));
    }
    if let Some(lint) = non_empty(context.lint_output()) {
        sections.push(format!("## Lint Results\n\n```\n{}\n```", lint.trim_end()));
    }

    sections.join("\n\n")
}

/// A started reviewer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSession {
    pub session_id: String,
    pub command: String,
    pub prompt: String,
}

/// Starts reviewer sessions through a [`SessionSpawner`].
pub struct CommandRunner {
    spawner: Arc<dyn SessionSpawner>,
}

impl CommandRunner {
    pub fn new(spawner: Arc<dyn SessionSpawner>) -> Self {
        Self { spawner }
    }

    /// Start the reviewer for `task_id` in the project's directory.
    pub async fn start(
        &self,
        project: &Project,
        task_id: &str,
        context: &ReviewContext,
        resolved: &ResolvedCommand,
    ) -> Result<ReviewSession, ReviewError> {
        let prompt = format_prompt(context);

        let outcome = self
            .spawner
            .spawn(
                project,
                SpawnOptions {
                    command: resolved.command.clone(),
                    working_dir: project.path.clone(),
                    model: resolved.model.clone(),
                },
            )
            .await;

        let session_id = match (outcome.success, outcome.session_id) {
            (true, Some(id)) => id,
            (_, _) => {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| "spawner returned no session".to_string());
                return Err(ReviewError::command(reason));
            }
        };

        if !self
            .spawner
            .tag_session(&session_id, SessionRole::Review, task_id)
            .await
        {
            warn!(session_id = %session_id, task_id, "Could not tag reviewer session");
        }

        debug!(
            session_id = %session_id,
            task_id,
            command = %resolved.command,
            prompt_len = prompt.len(),
            "Reviewer session started"
        );

        Ok(ReviewSession {
            session_id,
            command: resolved.command.clone(),
            prompt,
        })
    }

    /// Hand the prompt to the session and wait for the reviewer's answer.
    pub async fn collect_output(&self, session: &ReviewSession) -> Result<String> {
        self.spawner
            .send_prompt(&session.session_id, &session.prompt)
            .await?;
        self.spawner.await_output(&session.session_id).await
    }
}

//! Evidence gathering for a review attempt.
//!
//! The four segments (task definition, diff, tests, lint) are collected
//! concurrently and each one fails on its own terms:
//!
//! | Segment | Failure                    | Result                                   |
//! |---------|----------------------------|------------------------------------------|
//! | diff    | provider error             | `Degraded` with `[Error getting diff: …]` |
//! | tests   | no marker file             | `Unavailable`                            |
//! | tests   | timeout                    | `Degraded` with `[… timeout …]`           |
//! | tests   | command could not run      | `Failed` (hidden from the reviewer)      |
//! | lint    | same as tests              | same as tests                            |

use super::types::{ReviewContext, Segment};
use crate::ports::{DiffProvider, ShellOutcome, ShellRunner};
use gatekeeper_common::{ContextConfig, Project, ReviewConfig, Task};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A marker file and the command to run when it is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub marker: &'static str,
    pub command: &'static str,
}

/// Test commands, first match wins.
pub const TEST_PROBES: &[Probe] = &[
    Probe {
        marker: "pytest.ini",
        command: "python -m pytest --tb=short -q",
    },
    Probe {
        marker: "pyproject.toml",
        command: "python -m pytest --tb=short -q",
    },
    Probe {
        marker: "package.json",
        command: "npm test --silent",
    },
    Probe {
        marker: "Cargo.toml",
        command: "cargo test --quiet",
    },
    Probe {
        marker: "go.mod",
        command: "go test ./...",
    },
];

/// Lint commands, first match wins.
pub const LINT_PROBES: &[Probe] = &[
    Probe {
        marker: "ruff.toml",
        command: "ruff check .",
    },
    Probe {
        marker: "pyproject.toml",
        command: "ruff check .",
    },
    Probe {
        marker: "package.json",
        command: "npm run lint --silent",
    },
    Probe {
        marker: "Cargo.toml",
        command: "cargo clippy --quiet",
    },
    Probe {
        marker: "go.mod",
        command: "go vet ./...",
    },
];

/// First probe whose marker exists in `dir`.
pub async fn detect_probe(dir: &Path, probes: &[Probe]) -> Option<Probe> {
    for probe in probes {
        if tokio::fs::try_exists(dir.join(probe.marker))
            .await
            .unwrap_or(false)
        {
            return Some(*probe);
        }
    }
    None
}

/// Render the task as markdown: a heading, then Scope, Acceptance Criteria
/// and Notes sections for whichever of them are non-empty.
pub fn render_task_definition(task: &Task) -> String {
    let mut out = format!("# Task {}: {}\n", task.id, task.title);

    for (heading, body) in [
        ("Scope", &task.scope),
        ("Acceptance Criteria", &task.acceptance),
        ("Notes", &task.notes),
    ] {
        let body = body.trim();
        if !body.is_empty() {
            out.push_str(&format!("\n## {}\n{}\n", heading, body));
        }
    }

    out
}

/// Builds [`ReviewContext`]s.
pub struct ContextBuilder {
    diff: Arc<dyn DiffProvider>,
    shell: Arc<dyn ShellRunner>,
}

impl ContextBuilder {
    pub fn new(diff: Arc<dyn DiffProvider>, shell: Arc<dyn ShellRunner>) -> Self {
        Self { diff, shell }
    }

    /// Build with the project's own context settings.
    pub async fn build_default(&self, project: &Project, task: &Task) -> ReviewContext {
        let review = project.effective_review();
        self.build(project, task, &review.context).await
    }

    /// Collect every enabled segment. Never fails; see the module table for
    /// how each segment degrades.
    pub async fn build(
        &self,
        project: &Project,
        task: &Task,
        config: &ContextConfig,
    ) -> ReviewContext {
        let review = project.effective_review();

        let task_definition = if config.include_task {
            Segment::collected(render_task_definition(task))
        } else {
            Segment::Disabled
        };

        let (git_diff, test_output, lint_output) = tokio::join!(
            self.diff_segment(project, &review, config.include_diff),
            self.probe_segment(
                project,
                TEST_PROBES,
                "Test run",
                Duration::from_secs(review.test_timeout_secs),
                config.include_tests,
            ),
            self.probe_segment(
                project,
                LINT_PROBES,
                "Lint",
                Duration::from_secs(review.lint_timeout_secs),
                config.include_lint,
            ),
        );

        let context = ReviewContext {
            task_id: task.id.clone(),
            task_definition,
            git_diff,
            test_output,
            lint_output,
        };

        debug!(
            task_id = %task.id,
            degraded = ?context.degraded_segments(),
            "Review context built"
        );

        context
    }

    async fn diff_segment(&self, project: &Project, review: &ReviewConfig, enabled: bool) -> Segment {
        if !enabled {
            return Segment::Disabled;
        }

        match self
            .diff
            .diff(&project.path, review.staged_only, review.base_branch.as_deref())
            .await
        {
            Ok(diff) => Segment::collected(diff),
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(project_id = %project.id, error = %reason, "Diff unavailable for review context");
                Segment::Degraded {
                    text: format!("[Error getting diff: {}]", reason),
                    reason,
                }
            }
        }
    }

    async fn probe_segment(
        &self,
        project: &Project,
        probes: &[Probe],
        label: &str,
        timeout: Duration,
        enabled: bool,
    ) -> Segment {
        if !enabled {
            return Segment::Disabled;
        }

        let Some(probe) = detect_probe(&project.path, probes).await else {
            return Segment::Unavailable;
        };

        debug!(project_id = %project.id, command = probe.command, "Running context probe");

        match self.shell.run(probe.command, &project.path, timeout).await {
            ShellOutcome::Completed { output, .. } => Segment::collected(output),
            ShellOutcome::TimedOut { after } => {
                warn!(command = probe.command, timeout_secs = after.as_secs(), "Context probe timed out");
                Segment::Degraded {
                    text: format!("[{} timeout after {}s]", label, after.as_secs()),
                    reason: format!("{} timed out", probe.command),
                }
            }
            ShellOutcome::Failed { reason } => {
                warn!(command = probe.command, error = %reason, "Context probe failed");
                Segment::Failed { reason }
            }
        }
    }
}

//! Project and per-project review configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reviewer command used when a project has no review configuration.
pub const DEFAULT_REVIEW_COMMAND: &str = "claude";

/// Reviews allowed before a needs-revision result escalates to a human.
pub const DEFAULT_MAX_REVISIONS: u32 = 3;

pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_LINT_TIMEOUT_SECS: u64 = 60;

/// Which evidence segments go into a review context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "enabled")]
    pub include_task: bool,
    #[serde(default = "enabled")]
    pub include_diff: bool,
    #[serde(default = "enabled")]
    pub include_tests: bool,
    #[serde(default = "enabled")]
    pub include_lint: bool,
}

fn enabled() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            include_task: true,
            include_diff: true,
            include_tests: true,
            include_lint: true,
        }
    }
}

impl ContextConfig {
    /// A config with every segment turned off.
    pub fn none() -> Self {
        Self {
            include_task: false,
            include_diff: false,
            include_tests: false,
            include_lint: false,
        }
    }

    pub fn with_task(mut self, include: bool) -> Self {
        self.include_task = include;
        self
    }

    pub fn with_diff(mut self, include: bool) -> Self {
        self.include_diff = include;
        self
    }

    pub fn with_tests(mut self, include: bool) -> Self {
        self.include_tests = include;
        self
    }

    pub fn with_lint(mut self, include: bool) -> Self {
        self.include_lint = include;
        self
    }
}

/// Per-project review settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Reviewer agent command line.
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Model override appended to the command as `--model <model>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Diff against this branch instead of the working tree changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub staged_only: bool,
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_lint_timeout_secs")]
    pub lint_timeout_secs: u64,
    #[serde(default)]
    pub context: ContextConfig,
}

fn default_command() -> String {
    DEFAULT_REVIEW_COMMAND.to_string()
}

fn default_max_revisions() -> u32 {
    DEFAULT_MAX_REVISIONS
}

fn default_test_timeout_secs() -> u64 {
    DEFAULT_TEST_TIMEOUT_SECS
}

fn default_lint_timeout_secs() -> u64 {
    DEFAULT_LINT_TIMEOUT_SECS
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_command(),
            max_revisions: default_max_revisions(),
            model: None,
            base_branch: None,
            staged_only: false,
            test_timeout_secs: default_test_timeout_secs(),
            lint_timeout_secs: default_lint_timeout_secs(),
            context: ContextConfig::default(),
        }
    }
}

impl ReviewConfig {
    pub fn with_command(mut self, command: &str) -> Self {
        self.command = command.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_max_revisions(mut self, max: u32) -> Self {
        self.max_revisions = max;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_base_branch(mut self, branch: &str) -> Self {
        self.base_branch = Some(branch.to_string());
        self
    }

    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }
}

/// A project whose plan tasks get reviewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Working directory for diffs, probes and the reviewer process.
    pub path: PathBuf,
    /// `None` means the project never configured reviews; defaults apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewConfig>,
}

impl Project {
    pub fn new(id: &str, name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            path: path.into(),
            review: None,
        }
    }

    pub fn with_review(mut self, review: ReviewConfig) -> Self {
        self.review = Some(review);
        self
    }

    /// The review settings in effect: the configured ones, or the defaults.
    pub fn effective_review(&self) -> ReviewConfig {
        self.review.clone().unwrap_or_default()
    }

    pub fn max_revisions(&self) -> u32 {
        self.review
            .as_ref()
            .map_or(DEFAULT_MAX_REVISIONS, |r| r.max_revisions)
    }

    pub fn reviews_enabled(&self) -> bool {
        self.review.as_ref().is_none_or(|r| r.enabled)
    }
}

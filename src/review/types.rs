//! Review data types.
//!
//! - [`ReviewResult`]: outcome kind of one review attempt
//! - [`Verdict`]: what the output parser made of the reviewer's text
//! - [`TaskReview`]: the immutable record of one attempt
//! - [`Segment`] and [`ReviewContext`]: the evidence bundle sent to the reviewer
//!
//! ## Example
//!
//! ```
//! use gatekeeper::review::{ReviewResult, TaskReview, Verdict};
//!
//! let verdict = Verdict::new(ReviewResult::NeedsRevision)
//!     .with_issues(vec!["Missing tests for the parser".to_string()])
//!     .with_summary("Close, but untested.");
//!
//! let review = TaskReview::from_verdict("T3", 2, verdict, "claude");
//! assert_eq!(review.attempt(), 2);
//! assert!(review.result().needs_revision());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Most issues a review keeps.
pub const MAX_ISSUES: usize = 10;

/// Longest summary a review keeps, in characters, ellipsis included.
pub const MAX_SUMMARY_CHARS: usize = 300;

/// Outcome kind of a review attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewResult {
    /// The reviewer has not answered yet.
    #[default]
    Pending,
    Approved,
    NeedsRevision,
    Rejected,
}

impl ReviewResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    pub fn needs_revision(&self) -> bool {
        matches!(self, Self::NeedsRevision)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Pending => "…",
            Self::Approved => "✓",
            Self::NeedsRevision => "↻",
            Self::Rejected => "✗",
        }
    }
}

impl fmt::Display for ReviewResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::NeedsRevision => "needs-revision",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Structured reading of the reviewer's free-form text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub result: ReviewResult,
    pub issues: Vec<String>,
    pub summary: String,
    pub blocking: bool,
}

impl Verdict {
    pub fn new(result: ReviewResult) -> Self {
        Self {
            result,
            issues: Vec::new(),
            summary: String::new(),
            blocking: false,
        }
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }
}

/// One review attempt of one task.
///
/// Built once per attempt and never mutated afterwards. `attempt` is the
/// task's revision counter at attempt start, plus one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReview {
    id: String,
    task_id: String,
    attempt: u32,
    result: ReviewResult,
    issues: Vec<String>,
    summary: String,
    blocking: bool,
    timestamp: DateTime<Utc>,
    /// The literal reviewer command line used.
    command: String,
}

impl TaskReview {
    /// Placeholder registered while a review is in flight.
    pub fn pending(task_id: &str, attempt: u32, command: &str) -> Self {
        Self::from_verdict(task_id, attempt, Verdict::new(ReviewResult::Pending), command)
    }

    pub fn from_verdict(task_id: &str, attempt: u32, verdict: Verdict, command: &str) -> Self {
        let mut issues = verdict.issues;
        issues.truncate(MAX_ISSUES);
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            attempt,
            result: verdict.result,
            issues,
            summary: truncate_summary(&verdict.summary),
            blocking: verdict.blocking,
            timestamp: Utc::now(),
            command: command.to_string(),
        }
    }

    /// A needs-revision review standing in for an attempt that failed
    /// unexpectedly. The failure text is the only issue.
    pub fn synthesized_failure(task_id: &str, attempt: u32, error: &str, command: &str) -> Self {
        let verdict = Verdict::new(ReviewResult::NeedsRevision)
            .with_issues(vec![error.to_string()])
            .with_summary(format!("Review failed: {}", error));
        Self::from_verdict(task_id, attempt, verdict, command)
    }

    /// A new record for the same attempt carrying an externally decided result.
    pub fn resolved(&self, result: ReviewResult) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            result,
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn result(&self) -> ReviewResult {
        self.result
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl fmt::Display for TaskReview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Task {} attempt {}: {}",
            self.result.emoji(),
            self.task_id,
            self.attempt,
            self.result
        )?;
        if self.blocking {
            write!(f, " [blocking]")?;
        }
        if !self.summary.is_empty() {
            write!(f, "\n  {}", self.summary)?;
        }
        for issue in &self.issues {
            write!(f, "\n  - {}", issue)?;
        }
        Ok(())
    }
}

/// Cut `text` to [`MAX_SUMMARY_CHARS`] characters, ending with `...` when cut.
pub fn truncate_summary(text: &str) -> String {
    truncate_chars(text, MAX_SUMMARY_CHARS)
}

/// Cut `text` to at most `max` characters, the last three being `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// One evidence segment of a review context.
///
/// Failures are recorded here instead of aborting the build, so one broken
/// probe never costs the reviewer the other segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Segment {
    /// Turned off in the context config.
    Disabled,
    /// Nothing to collect (no recognised test or lint setup).
    Unavailable,
    Collected { text: String },
    /// Collection went wrong; `text` is an inline marker for the reviewer.
    Degraded { text: String, reason: String },
    /// Collection went wrong and nothing is shown to the reviewer.
    Failed { reason: String },
}

impl Segment {
    pub fn collected(text: impl Into<String>) -> Self {
        Self::Collected { text: text.into() }
    }

    /// Text the reviewer will see, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Collected { text } | Self::Degraded { text, .. } => Some(text),
            Self::Disabled | Self::Unavailable | Self::Failed { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. } | Self::Failed { .. })
    }
}

/// The evidence bundle for one review attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewContext {
    pub task_id: String,
    pub task_definition: Segment,
    pub git_diff: Segment,
    pub test_output: Segment,
    pub lint_output: Segment,
}

impl ReviewContext {
    /// A context with every segment disabled.
    pub fn empty(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            task_definition: Segment::Disabled,
            git_diff: Segment::Disabled,
            test_output: Segment::Disabled,
            lint_output: Segment::Disabled,
        }
    }

    pub fn with_task_definition(mut self, text: impl Into<String>) -> Self {
        self.task_definition = Segment::collected(text);
        self
    }

    pub fn with_git_diff(mut self, text: impl Into<String>) -> Self {
        self.git_diff = Segment::collected(text);
        self
    }

    pub fn with_test_output(mut self, text: impl Into<String>) -> Self {
        self.test_output = Segment::collected(text);
        self
    }

    pub fn with_lint_output(mut self, text: impl Into<String>) -> Self {
        self.lint_output = Segment::collected(text);
        self
    }

    pub fn task_definition(&self) -> Option<&str> {
        self.task_definition.text()
    }

    pub fn git_diff(&self) -> Option<&str> {
        self.git_diff.text()
    }

    pub fn test_output(&self) -> Option<&str> {
        self.test_output.text()
    }

    pub fn lint_output(&self) -> Option<&str> {
        self.lint_output.text()
    }

    /// Segments whose collection went wrong, by name.
    pub fn degraded_segments(&self) -> Vec<&'static str> {
        [
            ("task", &self.task_definition),
            ("diff", &self.git_diff),
            ("tests", &self.test_output),
            ("lint", &self.lint_output),
        ]
        .into_iter()
        .filter(|(_, segment)| segment.is_degraded())
        .map(|(name, _)| name)
        .collect()
    }
}

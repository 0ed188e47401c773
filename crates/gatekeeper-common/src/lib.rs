//! Shared domain types for the gatekeeper review pipeline.
//!
//! These types carry no I/O. The root crate owns loading them from disk,
//! reviewing tasks, and persisting status changes.

pub mod project;
pub mod task;

pub use project::{
    ContextConfig, DEFAULT_LINT_TIMEOUT_SECS, DEFAULT_MAX_REVISIONS, DEFAULT_REVIEW_COMMAND,
    DEFAULT_TEST_TIMEOUT_SECS, Project, ReviewConfig,
};
pub use task::{ParseStatusError, Task, TaskStatus};

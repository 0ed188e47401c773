//! Concrete collaborators used by the command-line tool.
//!
//! - [`git`]: diffs through libgit2
//! - [`shell`]: bounded `sh -c` commands for test and lint probes
//! - [`session`]: reviewer agents as child processes
//! - [`notify`]: desktop and log-only notifiers
//! - [`plan`]: the JSON plan file

pub mod git;
pub mod notify;
pub mod plan;
pub mod session;
pub mod shell;

pub use git::GitDiffProvider;
pub use notify::{DesktopNotifier, LogNotifier};
pub use plan::{JsonPlanStore, PlanFile};
pub use session::ProcessSessionSpawner;
pub use shell::TokioShellRunner;

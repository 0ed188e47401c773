//! Automated review of completed tasks.
//!
//! A task that finishes its work is handed to a reviewer agent. The agent's
//! free-form answer decides whether the task is done, goes back for another
//! attempt, or needs a human.
//!
//! ## Components
//!
//! - [`types`]: review records, verdicts and the review context
//! - [`context`]: gathers task definition, diff, test and lint output
//! - [`parser`]: turns reviewer text into a [`Verdict`]
//! - [`runner`]: builds the prompt and starts the reviewer session
//! - [`policy`]: decides completion, retry or escalation
//! - [`orchestrator`]: one review attempt end to end
//! - [`tracker`]: single-flight tracking across callers
//!
//! ## Example
//!
//! ```
//! use gatekeeper::review::parser::parse_output;
//! use gatekeeper::review::ReviewResult;
//!
//! let verdict = parse_output("Needs revision:\n- Missing tests for the error path");
//! assert_eq!(verdict.result, ReviewResult::NeedsRevision);
//! assert_eq!(verdict.issues, vec!["Missing tests for the error path"]);
//!
//! // Ambiguous output never approves.
//! assert_eq!(parse_output("").result, ReviewResult::NeedsRevision);
//! ```

mod active;
pub mod context;
pub mod orchestrator;
pub mod parser;
pub mod policy;
pub mod runner;
pub mod tracker;
pub mod types;

pub use active::ActiveReviews;
pub use context::ContextBuilder;
pub use orchestrator::Orchestrator;
pub use parser::{KeywordInterpreter, OutputInterpreter, StructuredInterpreter};
pub use policy::{EscalationReason, PolicyOutcome, RevisionPolicy};
pub use runner::{CommandRunner, ResolvedCommand, ReviewSession, format_prompt, resolve_command};
pub use tracker::{ReviewEvent, ReviewTracker};
pub use types::{ReviewContext, ReviewResult, Segment, TaskReview, Verdict};

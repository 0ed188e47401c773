//! One review attempt, start to finish.
//!
//! ```text
//! claim task ─► resolve command ─► start reviewer ─► collect output
//!                                      │                   │
//!                                 Err(Command)     Err ─► synthesized review
//!                                      │                   │
//!                                      ▼                   ▼
//!                               release claim  ◄─ apply policy ◄─ interpret
//! ```
//!
//! The claim on the active set is held by a guard, so the task id is gone
//! from it on every exit path, including when the future is dropped. A run
//! whose result was already decided by `ReviewTracker::complete` skips the
//! policy and leaves the task untouched.

use super::active::ActiveReviews;
use super::parser::{OutputInterpreter, StructuredInterpreter};
use super::policy::RevisionPolicy;
use super::runner::{CommandRunner, ResolvedCommand, resolve_command};
use super::types::{ReviewContext, TaskReview};
use crate::errors::ReviewError;
use crate::ports::{Notifier, PlanStatusSink, SessionSpawner};
use gatekeeper_common::{Project, Task};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Orchestrator {
    runner: CommandRunner,
    interpreter: Arc<dyn OutputInterpreter>,
    policy: RevisionPolicy,
    active: ActiveReviews,
}

impl Orchestrator {
    pub fn new(
        spawner: Arc<dyn SessionSpawner>,
        notifier: Arc<dyn Notifier>,
        plan: Arc<dyn PlanStatusSink>,
    ) -> Self {
        Self {
            runner: CommandRunner::new(spawner),
            interpreter: Arc::new(StructuredInterpreter::new()),
            policy: RevisionPolicy::new(notifier, plan),
            active: ActiveReviews::new(),
        }
    }

    /// Replace the output interpreter.
    pub fn with_interpreter(mut self, interpreter: Arc<dyn OutputInterpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn active(&self) -> &ActiveReviews {
        &self.active
    }

    /// Run one review attempt for `task`, updating it in place.
    ///
    /// Fails only if the task is already under review or the reviewer could
    /// not be started. Anything going wrong after that is folded into a
    /// needs-revision review.
    pub async fn run(
        &self,
        project: &Project,
        task: &mut Task,
        context: &ReviewContext,
    ) -> Result<TaskReview, ReviewError> {
        let resolved = resolve_command(project);
        let placeholder = TaskReview::pending(&task.id, task.next_attempt(), &resolved.command);
        let guard = self
            .active
            .claim(&task.id, placeholder)
            .ok_or_else(|| ReviewError::AlreadyRunning {
                task_id: task.id.clone(),
            })?;

        self.execute(project, task, context, resolved, guard.generation())
            .await
    }

    /// Run under a claim the caller already registered.
    pub(crate) async fn run_claimed(
        &self,
        project: &Project,
        task: &mut Task,
        context: &ReviewContext,
        generation: u64,
    ) -> Result<TaskReview, ReviewError> {
        let _guard = self.active.guard(&task.id, generation);
        self.execute(project, task, context, resolve_command(project), generation)
            .await
    }

    async fn execute(
        &self,
        project: &Project,
        task: &mut Task,
        context: &ReviewContext,
        resolved: ResolvedCommand,
        generation: u64,
    ) -> Result<TaskReview, ReviewError> {
        let attempt = task.next_attempt();

        let session = self
            .runner
            .start(project, &task.id, context, &resolved)
            .await?;

        let review = match self.runner.collect_output(&session).await {
            Ok(output) => self.interpret(&task.id, attempt, &output, &resolved.command),
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(task_id = %task.id, attempt, error = %error, "Reviewer failed; synthesizing review");
                TaskReview::synthesized_failure(&task.id, attempt, &error, &resolved.command)
            }
        };

        if !self.active.settle_by_run(&task.id, generation) {
            info!(
                task_id = %task.id,
                attempt,
                "Review was completed externally; leaving the task as it is"
            );
            return Ok(review);
        }

        let outcome = self.policy.apply(project, task, &review).await;

        info!(
            task_id = %task.id,
            attempt,
            result = %review.result(),
            blocking = review.is_blocking(),
            outcome = ?outcome,
            "Review finished"
        );

        Ok(review)
    }

    /// Interpret reviewer output. A panicking interpreter yields a
    /// synthesized review instead of taking the attempt down.
    fn interpret(&self, task_id: &str, attempt: u32, output: &str, command: &str) -> TaskReview {
        match catch_unwind(AssertUnwindSafe(|| self.interpreter.interpret(output))) {
            Ok(verdict) => TaskReview::from_verdict(task_id, attempt, verdict, command),
            Err(payload) => {
                let error = format!("Output interpreter panicked: {}", panic_message(payload.as_ref()));
                warn!(task_id, attempt, error = %error, "Synthesizing review");
                TaskReview::synthesized_failure(task_id, attempt, &error, command)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NotificationSound;
    use crate::review::parser::KeywordInterpreter;
    use crate::review::types::ReviewResult;
    use crate::testing::{RecordingNotifier, RecordingPlanSink, ScriptedSpawner};
    use gatekeeper_common::{ReviewConfig, TaskStatus};

    struct Harness {
        orchestrator: Orchestrator,
        spawner: Arc<ScriptedSpawner>,
        notifier: Arc<RecordingNotifier>,
        plan: Arc<RecordingPlanSink>,
    }

    fn harness(spawner: ScriptedSpawner) -> Harness {
        let spawner = Arc::new(spawner);
        let notifier = Arc::new(RecordingNotifier::new());
        let plan = Arc::new(RecordingPlanSink::new());
        let orchestrator = Orchestrator::new(spawner.clone(), notifier.clone(), plan.clone());
        Harness {
            orchestrator,
            spawner,
            notifier,
            plan,
        }
    }

    fn configured_project() -> Project {
        Project::new("web", "Web", "/srv/web")
            .with_review(ReviewConfig::default().with_max_revisions(3))
    }

    fn context() -> ReviewContext {
        ReviewContext::empty("T1").with_task_definition("# Task T1: Login")
    }

    #[tokio::test]
    async fn test_attempt_is_revision_count_plus_one() {
        let h = harness(ScriptedSpawner::replying("LGTM, looks good"));
        let mut task = Task::new("T1", "Login").with_revision_count(1);

        let review = h
            .orchestrator
            .run(&configured_project(), &mut task, &context())
            .await
            .unwrap();

        assert_eq!(review.attempt(), 2);
        assert_eq!(review.result(), ReviewResult::Approved);
        assert_eq!(task.status, TaskStatus::Complete);
        assert!(h.notifier.sent().is_empty());
        assert_eq!(h.plan.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_no_review_config_uses_default_command() {
        let h = harness(ScriptedSpawner::replying("approved"));
        let project = Project::new("web", "Web", "/srv/web");
        let mut task = Task::new("T1", "Login");

        let review = h.orchestrator.run(&project, &mut task, &context()).await.unwrap();

        assert_eq!(review.command(), "claude");
        assert_eq!(h.spawner.spawn_requests()[0].command, "claude");
    }

    #[tokio::test]
    async fn test_spawn_failure_propagates_and_releases_task() {
        let h = harness(ScriptedSpawner::failing_spawn("session limit reached"));
        let mut task = Task::new("T1", "Login");

        let err = h
            .orchestrator
            .run(&configured_project(), &mut task, &context())
            .await
            .unwrap_err();

        assert!(err.is_command_error());
        assert!(!h.orchestrator.active().contains("T1"));
        assert!(h.plan.updates().is_empty());
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_output_failure_synthesizes_needs_revision() {
        let h = harness(ScriptedSpawner::failing_output("agent exited with status 137"));
        let mut task = Task::new("T1", "Login");

        let review = h
            .orchestrator
            .run(&configured_project(), &mut task, &context())
            .await
            .unwrap();

        assert_eq!(review.result(), ReviewResult::NeedsRevision);
        assert_eq!(review.issues().len(), 1);
        assert!(review.issues()[0].contains("status 137"));
        assert_eq!(task.revision_count, 1);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(h.plan.updates().len(), 1);
        assert!(!h.orchestrator.active().contains("T1"));
    }

    #[tokio::test]
    async fn test_last_attempt_escalates_once_with_failed_title() {
        let h = harness(ScriptedSpawner::replying("needs revision: missing tests"));
        let mut task = Task::new("T1", "Login").with_revision_count(2);

        let review = h
            .orchestrator
            .run(&configured_project(), &mut task, &context())
            .await
            .unwrap();

        assert_eq!(review.attempt(), 3);
        assert_eq!(review.result(), ReviewResult::NeedsRevision);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].title.contains("Failed"));
        assert_eq!(sent[0].sound, Some(NotificationSound::Failure));
        assert_eq!(task.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn test_task_already_active_is_refused() {
        let h = harness(ScriptedSpawner::replying("LGTM"));
        let _held = h
            .orchestrator
            .active()
            .claim("T1", TaskReview::pending("T1", 1, "claude"))
            .unwrap();
        let mut task = Task::new("T1", "Login");

        let err = h
            .orchestrator
            .run(&configured_project(), &mut task, &context())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ReviewError::AlreadyRunning {
                task_id: "T1".to_string()
            }
        );
        assert!(h.spawner.spawn_requests().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_run_releases_task() {
        let h = harness(ScriptedSpawner::replying("LGTM").gated());
        let project = configured_project();
        let mut task = Task::new("T1", "Login");
        let ctx = context();

        {
            let run = h.orchestrator.run(&project, &mut task, &ctx);
            tokio::pin!(run);
            let polled = tokio::time::timeout(std::time::Duration::from_millis(20), &mut run).await;
            assert!(polled.is_err());
            assert!(h.orchestrator.active().contains("T1"));
        }

        assert!(!h.orchestrator.active().contains("T1"));
        assert_eq!(h.spawner.spawn_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_interpreter_is_used() {
        let h = harness(ScriptedSpawner::replying(r#"{"verdict": "approved"}"#));
        let orchestrator = h.orchestrator.with_interpreter(Arc::new(KeywordInterpreter));
        let mut task = Task::new("T1", "Login");

        let review = orchestrator
            .run(&configured_project(), &mut task, &context())
            .await
            .unwrap();

        assert_eq!(review.result(), ReviewResult::Approved);
    }

    struct PanickingInterpreter;

    impl OutputInterpreter for PanickingInterpreter {
        fn interpret(&self, _output: &str) -> crate::review::Verdict {
            panic!("verdict table corrupted")
        }
    }

    #[tokio::test]
    async fn test_panicking_interpreter_synthesizes_review() {
        let h = harness(ScriptedSpawner::replying("LGTM"));
        let orchestrator = h.orchestrator.with_interpreter(Arc::new(PanickingInterpreter));
        let mut task = Task::new("T1", "Login");

        let review = orchestrator
            .run(&configured_project(), &mut task, &context())
            .await
            .unwrap();

        assert_eq!(review.result(), ReviewResult::NeedsRevision);
        assert_eq!(review.issues().len(), 1);
        assert!(review.issues()[0].contains("verdict table corrupted"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(h.plan.updates().len(), 1);
        assert!(!orchestrator.active().contains("T1"));
    }

    #[tokio::test]
    async fn test_externally_settled_run_leaves_task_alone() {
        let h = harness(ScriptedSpawner::replying("needs work").gated());
        let mut task = Task::new("T1", "Login").with_status(TaskStatus::AwaitingReview);

        let project = configured_project();
        let ctx = context();
        let (review, _) = tokio::join!(
            h.orchestrator.run(&project, &mut task, &ctx),
            async {
                while !h.orchestrator.active().contains("T1") {
                    tokio::task::yield_now().await;
                }
                let entry = h.orchestrator.active().entry("T1").unwrap();
                let external = entry.review.resolved(ReviewResult::Approved);
                assert!(entry.settlement.settle_externally(Arc::new(external)));
                h.spawner.release();
            }
        );

        assert_eq!(review.unwrap().result(), ReviewResult::NeedsRevision);
        assert_eq!(task.status, TaskStatus::AwaitingReview);
        assert_eq!(task.revision_count, 0);
        assert!(h.plan.updates().is_empty());
        assert!(h.notifier.sent().is_empty());
        assert!(!h.orchestrator.active().contains("T1"));
    }
}

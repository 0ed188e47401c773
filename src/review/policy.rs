//! What happens to a task after a review.
//!
//! | Result         | Attempt vs. max | Blocking | Outcome                              |
//! |----------------|-----------------|----------|--------------------------------------|
//! | approved       | any             | false    | task complete, no notification       |
//! | approved       | any             | true     | escalate (blocking)                  |
//! | needs-revision | < max           | false    | back to pending, no notification     |
//! | needs-revision | ≥ max           | any      | escalate: failed after N attempts    |
//! | needs-revision | < max           | true     | escalate (blocking)                  |
//! | rejected       | any             | any      | escalate: rejected                   |
//!
//! Every escalation sends exactly one notification. The plan sink hears about
//! the task's new status last, whether or not anyone was notified.

use super::types::{ReviewResult, TaskReview, truncate_chars};
use crate::ports::{Notification, NotificationSound, Notifier, PlanStatusSink};
use gatekeeper_common::{Project, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Characters of the task title kept in a notification title.
pub const NOTIFY_TITLE_CHARS: usize = 30;

/// Characters of the review summary kept in a notification body.
pub const NOTIFY_SUMMARY_CHARS: usize = 100;

/// Why a review needs a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum EscalationReason {
    /// Needs-revision on the last allowed attempt.
    RevisionLimit { attempts: u32 },
    Rejected,
    /// Severity keywords flagged the review.
    Blocking,
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RevisionLimit { attempts } => write!(f, "failed after {} attempts", attempts),
            Self::Rejected => write!(f, "rejected"),
            Self::Blocking => write!(f, "blocking issue"),
        }
    }
}

/// Decision taken for a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PolicyOutcome {
    Completed,
    /// Sent back for another attempt.
    RevisionPending,
    Escalated {
        #[serde(flatten)]
        reason: EscalationReason,
    },
}

impl PolicyOutcome {
    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Escalated { .. })
    }

    /// Status the task moves to.
    pub fn task_status(&self) -> TaskStatus {
        match self {
            Self::Completed => TaskStatus::Complete,
            Self::RevisionPending => TaskStatus::Pending,
            Self::Escalated { .. } => TaskStatus::Blocked,
        }
    }
}

/// Pure decision for a review under a revision limit.
pub fn decide(review: &TaskReview, max_revisions: u32) -> PolicyOutcome {
    let escalate = |reason| PolicyOutcome::Escalated { reason };

    match review.result() {
        ReviewResult::Rejected => escalate(EscalationReason::Rejected),
        ReviewResult::Approved if review.is_blocking() => escalate(EscalationReason::Blocking),
        ReviewResult::Approved => PolicyOutcome::Completed,
        ReviewResult::NeedsRevision | ReviewResult::Pending => {
            if review.attempt() >= max_revisions {
                escalate(EscalationReason::RevisionLimit {
                    attempts: review.attempt(),
                })
            } else if review.is_blocking() {
                escalate(EscalationReason::Blocking)
            } else {
                PolicyOutcome::RevisionPending
            }
        }
    }
}

/// The notification sent for an escalated review.
pub fn escalation_notification(
    task: &Task,
    review: &TaskReview,
    reason: EscalationReason,
) -> Notification {
    let title = truncate_chars(&task.title, NOTIFY_TITLE_CHARS);
    let detail = if review.summary().is_empty() {
        review
            .issues()
            .first()
            .map(String::as_str)
            .unwrap_or("No summary provided")
    } else {
        review.summary()
    };
    let detail = truncate_chars(detail, NOTIFY_SUMMARY_CHARS);

    let (title, message, sound) = match reason {
        EscalationReason::RevisionLimit { attempts } => (
            format!("Review Failed: {}", title),
            format!("Failed after {} attempts: {}", attempts, detail),
            NotificationSound::Failure,
        ),
        EscalationReason::Rejected => (
            format!("Review Rejected: {}", title),
            format!("Rejected / blocking issue: {}", detail),
            NotificationSound::Default,
        ),
        EscalationReason::Blocking => (
            format!("Review Blocked: {}", title),
            format!("Blocking issue needs human review: {}", detail),
            NotificationSound::Default,
        ),
    };

    Notification::new(title, message)
        .with_subtitle(format!("Task {} · attempt {}", task.id, review.attempt()))
        .with_sound(sound)
}

/// Applies decisions: mutates the task, escalates, informs the plan.
pub struct RevisionPolicy {
    notifier: Arc<dyn Notifier>,
    plan: Arc<dyn PlanStatusSink>,
}

impl RevisionPolicy {
    pub fn new(notifier: Arc<dyn Notifier>, plan: Arc<dyn PlanStatusSink>) -> Self {
        Self { notifier, plan }
    }

    pub async fn apply(&self, project: &Project, task: &mut Task, review: &TaskReview) -> PolicyOutcome {
        let outcome = decide(review, project.max_revisions());

        task.status = outcome.task_status();
        if matches!(
            review.result(),
            ReviewResult::NeedsRevision | ReviewResult::Pending
        ) {
            task.revision_count = task.revision_count.saturating_add(1);
        }

        match outcome {
            PolicyOutcome::Escalated { reason } => {
                info!(
                    task_id = %task.id,
                    attempt = review.attempt(),
                    %reason,
                    "Escalating review to a human"
                );
                let notification = escalation_notification(task, review, reason);
                if !self.notifier.notify(&notification).await {
                    warn!(task_id = %task.id, "Escalation notification was not delivered");
                }
            }
            PolicyOutcome::Completed | PolicyOutcome::RevisionPending => {
                debug!(
                    task_id = %task.id,
                    attempt = review.attempt(),
                    status = %task.status,
                    "Review applied without escalation"
                );
            }
        }

        self.plan.update_task_status(&project.id, task).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::types::Verdict;
    use crate::testing::{RecordingNotifier, RecordingPlanSink};
    use gatekeeper_common::ReviewConfig;

    fn review(result: ReviewResult, attempt: u32, blocking: bool) -> TaskReview {
        let verdict = Verdict::new(result)
            .with_summary("Missing tests for the retry path")
            .with_blocking(blocking);
        TaskReview::from_verdict("T1", attempt, verdict, "claude")
    }

    fn project(max: u32) -> Project {
        Project::new("web", "Web", "/srv/web")
            .with_review(ReviewConfig::default().with_max_revisions(max))
    }

    fn policy() -> (RevisionPolicy, Arc<RecordingNotifier>, Arc<RecordingPlanSink>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let plan = Arc::new(RecordingPlanSink::new());
        (RevisionPolicy::new(notifier.clone(), plan.clone()), notifier, plan)
    }

    // =========================================
    // decide
    // =========================================

    #[test]
    fn test_decide_table() {
        use EscalationReason as E;
        use ReviewResult as R;

        let escalated = |reason| PolicyOutcome::Escalated { reason };
        let cases = [
            (R::Approved, 1, false, PolicyOutcome::Completed),
            (R::Approved, 5, false, PolicyOutcome::Completed),
            (R::Approved, 1, true, escalated(E::Blocking)),
            (R::NeedsRevision, 1, false, PolicyOutcome::RevisionPending),
            (R::NeedsRevision, 3, false, escalated(E::RevisionLimit { attempts: 3 })),
            (R::NeedsRevision, 4, true, escalated(E::RevisionLimit { attempts: 4 })),
            (R::NeedsRevision, 1, true, escalated(E::Blocking)),
            (R::Rejected, 1, false, escalated(E::Rejected)),
            (R::Rejected, 9, true, escalated(E::Rejected)),
        ];

        for (result, attempt, blocking, expected) in cases {
            assert_eq!(
                decide(&review(result, attempt, blocking), 3),
                expected,
                "{:?} attempt {} blocking {}",
                result,
                attempt,
                blocking
            );
        }
    }

    // =========================================
    // escalation_notification
    // =========================================

    #[test]
    fn test_notification_truncates_title_and_summary() {
        let task = Task::new("T1", "Implement the entire billing subsystem end to end");
        let verdict = Verdict::new(ReviewResult::NeedsRevision).with_summary("s".repeat(250));
        let review = TaskReview::from_verdict("T1", 3, verdict, "claude");

        let n = escalation_notification(&task, &review, EscalationReason::RevisionLimit { attempts: 3 });

        assert!(n.title.starts_with("Review Failed: "));
        assert_eq!(n.title.chars().count(), "Review Failed: ".len() + NOTIFY_TITLE_CHARS);
        assert!(n.message.starts_with("Failed after 3 attempts: "));
        assert_eq!(
            n.message.chars().count(),
            "Failed after 3 attempts: ".len() + NOTIFY_SUMMARY_CHARS
        );
        assert_eq!(n.sound, Some(NotificationSound::Failure));
    }

    #[test]
    fn test_notification_rejected_uses_first_issue_without_summary() {
        let task = Task::new("T2", "Auth");
        let verdict = Verdict::new(ReviewResult::Rejected)
            .with_issues(vec!["Password stored in plaintext".to_string()]);
        let review = TaskReview::from_verdict("T2", 1, verdict, "claude");

        let n = escalation_notification(&task, &review, EscalationReason::Rejected);

        assert_eq!(n.title, "Review Rejected: Auth");
        assert!(n.message.contains("Password stored in plaintext"));
        assert_ne!(n.sound, Some(NotificationSound::Failure));
    }

    // =========================================
    // RevisionPolicy::apply
    // =========================================

    #[tokio::test]
    async fn test_apply_approved_completes_silently() {
        let (policy, notifier, plan) = policy();
        let mut task = Task::new("T1", "Login");

        let outcome = policy
            .apply(&project(3), &mut task, &review(ReviewResult::Approved, 1, false))
            .await;

        assert_eq!(outcome, PolicyOutcome::Completed);
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.revision_count, 0);
        assert!(notifier.sent().is_empty());
        assert_eq!(plan.updates().len(), 1);
        assert_eq!(plan.updates()[0].1.status, TaskStatus::Complete);
    }

    #[tokio::test]
    async fn test_apply_revision_under_limit_is_silent() {
        let (policy, notifier, plan) = policy();
        let mut task = Task::new("T1", "Login").with_revision_count(0);

        let outcome = policy
            .apply(&project(3), &mut task, &review(ReviewResult::NeedsRevision, 1, false))
            .await;

        assert_eq!(outcome, PolicyOutcome::RevisionPending);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.revision_count, 1);
        assert!(notifier.sent().is_empty());
        assert_eq!(plan.updates()[0].0, "web");
    }

    #[tokio::test]
    async fn test_apply_blocking_notifies_once_for_every_result() {
        for result in [
            ReviewResult::Approved,
            ReviewResult::NeedsRevision,
            ReviewResult::Rejected,
        ] {
            let (policy, notifier, plan) = policy();
            let mut task = Task::new("T1", "Login");

            let outcome = policy.apply(&project(3), &mut task, &review(result, 1, true)).await;

            assert!(outcome.is_escalated(), "{:?}", result);
            assert_eq!(notifier.sent().len(), 1, "{:?}", result);
            assert_eq!(task.status, TaskStatus::Blocked);
            assert_eq!(plan.updates().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_apply_limit_reached_escalates_with_failure_sound() {
        let (policy, notifier, _plan) = policy();
        let mut task = Task::new("T1", "Login").with_revision_count(2);

        let outcome = policy
            .apply(&project(3), &mut task, &review(ReviewResult::NeedsRevision, 3, false))
            .await;

        assert_eq!(
            outcome,
            PolicyOutcome::Escalated {
                reason: EscalationReason::RevisionLimit { attempts: 3 }
            }
        );
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].title.contains("Failed"));
        assert_eq!(sent[0].sound, Some(NotificationSound::Failure));
        assert_eq!(task.revision_count, 3);
        assert_eq!(task.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn test_apply_rejection_escalates_on_first_attempt() {
        let (policy, notifier, _plan) = policy();
        let mut task = Task::new("T1", "Login");

        policy
            .apply(&project(3), &mut task, &review(ReviewResult::Rejected, 1, false))
            .await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].title.contains("Rejected"));
        assert_eq!(task.revision_count, 0);
    }

    #[tokio::test]
    async fn test_apply_undelivered_notification_still_updates_plan() {
        let notifier = Arc::new(RecordingNotifier::undeliverable());
        let plan = Arc::new(RecordingPlanSink::new());
        let policy = RevisionPolicy::new(notifier.clone(), plan.clone());
        let mut task = Task::new("T1", "Login");

        policy
            .apply(&project(1), &mut task, &review(ReviewResult::NeedsRevision, 1, false))
            .await;

        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(plan.updates().len(), 1);
    }
}

//! Single-flight review tracking.
//!
//! [`ReviewTracker::start`] registers a pending placeholder for the task,
//! spawns the review on the runtime and hands out a shared handle to it.
//! Any caller asking for the same task while it is active awaits that same
//! handle and receives the same `Arc<TaskReview>`. Because the run lives in
//! its own spawned task, dropping a caller's future never cancels the review
//! or skips its cleanup.
//!
//! Every run ends with exactly one terminal event, either from the run
//! itself or from [`ReviewTracker::complete`], whichever settles first.

use super::active::{ActiveEntry, ActiveReviews, Claim, Settlement, SharedRun};
use super::context::ContextBuilder;
use super::orchestrator::Orchestrator;
use super::runner::resolve_command;
use super::types::{ReviewResult, TaskReview};
use crate::errors::ReviewError;
use crate::ports::PlanSource;
use futures::FutureExt;
use gatekeeper_common::{Project, Task};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Lifecycle events for tracked reviews.
#[derive(Debug, Clone)]
pub enum ReviewEvent {
    /// A run was registered; `review` is the pending placeholder.
    Started { task_id: String, review: TaskReview },
    Completed { task_id: String, review: TaskReview },
    Failed { task_id: String, error: ReviewError },
}

impl ReviewEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Started { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. } => task_id,
        }
    }
}

struct TrackerInner {
    plan: Arc<dyn PlanSource>,
    builder: Arc<ContextBuilder>,
    orchestrator: Arc<Orchestrator>,
    active: ActiveReviews,
    events: broadcast::Sender<ReviewEvent>,
    history: Mutex<HashMap<String, Vec<TaskReview>>>,
}

impl TrackerInner {
    fn emit(&self, event: ReviewEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn record(&self, review: &TaskReview) {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history
            .entry(review.task_id().to_string())
            .or_default()
            .push(review.clone());
    }

    fn finish(
        &self,
        task_id: &str,
        generation: u64,
        settlement: &Settlement,
        result: &Result<Arc<TaskReview>, ReviewError>,
    ) {
        self.active.release(task_id, generation);

        if !settlement.settle_by_run() {
            debug!(task_id, "Review already completed externally; run result not recorded");
            return;
        }

        match result {
            Ok(review) => {
                self.record(review);
                self.emit(ReviewEvent::Completed {
                    task_id: task_id.to_string(),
                    review: review.as_ref().clone(),
                });
            }
            Err(error) => {
                warn!(task_id, error = %error, "Tracked review failed");
                self.emit(ReviewEvent::Failed {
                    task_id: task_id.to_string(),
                    error: error.clone(),
                });
            }
        }
    }
}

/// Tracks in-flight reviews and guarantees one run per task.
#[derive(Clone)]
pub struct ReviewTracker {
    inner: Arc<TrackerInner>,
}

impl ReviewTracker {
    /// The tracker shares the orchestrator's active set.
    pub fn new(
        plan: Arc<dyn PlanSource>,
        builder: Arc<ContextBuilder>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let active = orchestrator.active().clone();
        Self {
            inner: Arc::new(TrackerInner {
                plan,
                builder,
                orchestrator,
                active,
                events,
                history: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Review `task_id`, or join the review already running for it.
    pub async fn start(&self, task_id: &str, project_id: &str) -> Result<Arc<TaskReview>, ReviewError> {
        if let Some(run) = self.inner.active.run_for(task_id) {
            debug!(task_id, "Joining in-flight review");
            return run.await;
        }

        let project = self
            .inner
            .plan
            .project(project_id)
            .await
            .ok_or_else(|| ReviewError::ProjectNotFound {
                project_id: project_id.to_string(),
            })?;
        if !project.reviews_enabled() {
            return Err(ReviewError::ReviewsDisabled {
                project_id: project_id.to_string(),
            });
        }
        let task = self
            .inner
            .plan
            .task(project_id, task_id)
            .await
            .ok_or_else(|| ReviewError::TaskNotFound {
                project_id: project_id.to_string(),
                task_id: task_id.to_string(),
            })?;

        let resolved = resolve_command(&project);
        let placeholder = TaskReview::pending(task_id, task.next_attempt(), &resolved.command);

        let mut spawned = None;
        let claim = self.inner.active.claim_or_join(task_id, |generation| {
            let entry = ActiveEntry::new(generation, placeholder.clone());
            self.inner.emit(ReviewEvent::Started {
                task_id: task_id.to_string(),
                review: placeholder,
            });
            let (run, abort) = self.spawn_run(project, task, generation, entry.settlement.clone());
            spawned = Some(run.clone());
            entry.with_run(run, abort)
        });

        let run = match claim {
            Claim::Claimed(generation) => {
                info!(task_id, project_id, generation, "Review started");
                spawned
            }
            Claim::Joined(run) => run,
        };

        match run {
            Some(run) => run.await,
            // Held by a direct orchestrator run with nothing to join.
            None => Err(ReviewError::AlreadyRunning {
                task_id: task_id.to_string(),
            }),
        }
    }

    fn spawn_run(
        &self,
        project: Project,
        task: Task,
        generation: u64,
        settlement: Arc<Settlement>,
    ) -> (SharedRun, AbortHandle) {
        let inner = self.inner.clone();
        let task_id = task.id.clone();

        let handle = tokio::spawn({
            let task_id = task_id.clone();
            let settlement = settlement.clone();
            async move {
                let run = {
                    let inner = inner.clone();
                    async move {
                        let mut task = task;
                        let context = inner.builder.build_default(&project, &task).await;
                        inner
                            .orchestrator
                            .run_claimed(&project, &mut task, &context, generation)
                            .await
                    }
                };

                let result = match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(result) => result.map(Arc::new),
                    Err(_) => Err(ReviewError::Aborted {
                        task_id: task_id.clone(),
                        reason: "review run panicked".to_string(),
                    }),
                };

                inner.finish(&task_id, generation, &settlement, &result);
                result
            }
        });

        let abort = handle.abort_handle();
        let run = async move {
            let result = handle.await;
            // An external result wins over whatever the run produced.
            if let Some(review) = settlement.external() {
                return Ok(review);
            }
            result.unwrap_or_else(|e| {
                Err(ReviewError::Aborted {
                    task_id,
                    reason: e.to_string(),
                })
            })
        }
        .boxed()
        .shared();

        (run, abort)
    }

    /// Settle an active review with an externally decided result.
    ///
    /// The background run is stopped and never applies its own policy, and
    /// callers waiting in [`start`](Self::start) receive this review. Returns
    /// `None` when the task has no active review or its run already settled.
    /// Never fails.
    pub fn complete(&self, task_id: &str, result: ReviewResult) -> Option<TaskReview> {
        let Some(entry) = self.inner.active.entry(task_id) else {
            debug!(task_id, "complete() for a task with no active review");
            return None;
        };

        let review = Arc::new(entry.review.resolved(result));
        if !entry.settlement.settle_externally(review.clone()) {
            debug!(task_id, "Review already settled");
            return None;
        }

        self.inner.active.release(task_id, entry.generation);
        if let Some(abort) = &entry.abort {
            abort.abort();
        }

        info!(task_id, result = %result, "Review completed externally");
        self.inner.record(&review);
        self.inner.emit(ReviewEvent::Completed {
            task_id: task_id.to_string(),
            review: review.as_ref().clone(),
        });
        Some(review.as_ref().clone())
    }

    pub fn is_in_progress(&self, task_id: &str) -> bool {
        self.inner.active.contains(task_id)
    }

    /// The pending placeholder of an in-flight review.
    pub fn active_review(&self, task_id: &str) -> Option<TaskReview> {
        self.inner.active.placeholder(task_id)
    }

    pub fn active_tasks(&self) -> Vec<String> {
        self.inner.active.task_ids()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
        self.inner.events.subscribe()
    }

    /// Settled reviews of a task, oldest first.
    pub fn history(&self, task_id: &str) -> Vec<TaskReview> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }
}

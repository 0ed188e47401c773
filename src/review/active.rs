//! The set of reviews currently in flight, keyed by task id.
//!
//! Presence of a key is the per-task lock: the orchestrator will not run a
//! task twice while its key is present, and the tracker hands every caller
//! of an active task the same shared run. Entries carry a generation so a
//! finishing run never removes an entry registered after it.

use super::types::TaskReview;
use crate::errors::ReviewError;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::AbortHandle;

/// A run every concurrent caller can await.
pub(crate) type SharedRun = Shared<BoxFuture<'static, Result<Arc<TaskReview>, ReviewError>>>;

#[derive(Clone)]
pub(crate) struct ActiveEntry {
    pub generation: u64,
    /// Pending placeholder until the run settles.
    pub review: TaskReview,
    pub run: Option<SharedRun>,
    /// Stops the spawned run when its result is decided externally.
    pub abort: Option<Arc<AbortHandle>>,
    pub settlement: Arc<Settlement>,
}

impl ActiveEntry {
    pub fn new(generation: u64, review: TaskReview) -> Self {
        Self {
            generation,
            review,
            run: None,
            abort: None,
            settlement: Arc::new(Settlement::default()),
        }
    }

    pub fn with_run(mut self, run: SharedRun, abort: AbortHandle) -> Self {
        self.run = Some(run);
        self.abort = Some(Arc::new(abort));
        self
    }
}

#[derive(Debug, Default)]
enum SettleState {
    #[default]
    Open,
    ByRun,
    External(Arc<TaskReview>),
}

/// Who decides a run's result: the run itself or `complete()`. The first
/// to settle wins and the other backs off.
#[derive(Debug, Default)]
pub(crate) struct Settlement {
    state: Mutex<SettleState>,
}

impl Settlement {
    fn lock(&self) -> MutexGuard<'_, SettleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the result for the run. Stays `true` for a run that already
    /// holds it.
    pub fn settle_by_run(&self) -> bool {
        let mut state = self.lock();
        match *state {
            SettleState::Open => {
                *state = SettleState::ByRun;
                true
            }
            SettleState::ByRun => true,
            SettleState::External(_) => false,
        }
    }

    /// Settle with a result decided outside the run. `false` once settled.
    pub fn settle_externally(&self, review: Arc<TaskReview>) -> bool {
        let mut state = self.lock();
        if matches!(*state, SettleState::Open) {
            *state = SettleState::External(review);
            true
        } else {
            false
        }
    }

    pub fn external(&self) -> Option<Arc<TaskReview>> {
        match &*self.lock() {
            SettleState::External(review) => Some(review.clone()),
            _ => None,
        }
    }
}

/// Either a fresh claim on the task or the run someone else already owns.
pub(crate) enum Claim {
    Claimed(u64),
    Joined(Option<SharedRun>),
}

/// Shared handle to the active set. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct ActiveReviews {
    entries: Arc<Mutex<HashMap<String, ActiveEntry>>>,
    next_generation: Arc<AtomicU64>,
}

impl ActiveReviews {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.lock().contains_key(task_id)
    }

    /// The placeholder review of an active task.
    pub fn placeholder(&self, task_id: &str) -> Option<TaskReview> {
        self.lock().get(task_id).map(|entry| entry.review.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted ids of the active tasks.
    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn run_for(&self, task_id: &str) -> Option<SharedRun> {
        self.lock().get(task_id).and_then(|entry| entry.run.clone())
    }

    pub(crate) fn entry(&self, task_id: &str) -> Option<ActiveEntry> {
        self.lock().get(task_id).cloned()
    }

    /// Claim the result of the given run for the run itself. `false` once
    /// it was settled externally or the entry is gone.
    pub(crate) fn settle_by_run(&self, task_id: &str, generation: u64) -> bool {
        self.lock()
            .get(task_id)
            .filter(|entry| entry.generation == generation)
            .is_some_and(|entry| entry.settlement.settle_by_run())
    }

    /// Register `task_id` unless it is already active. `make` builds the
    /// entry from its generation and runs under the lock, so it must not block.
    pub(crate) fn claim_or_join(
        &self,
        task_id: &str,
        make: impl FnOnce(u64) -> ActiveEntry,
    ) -> Claim {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(task_id) {
            return Claim::Joined(existing.run.clone());
        }
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        entries.insert(task_id.to_string(), make(generation));
        Claim::Claimed(generation)
    }

    /// Register a bare entry and return a guard releasing it, or `None` if
    /// the task is already active.
    pub(crate) fn claim(&self, task_id: &str, review: TaskReview) -> Option<ActiveGuard> {
        match self.claim_or_join(task_id, |generation| ActiveEntry::new(generation, review)) {
            Claim::Claimed(generation) => Some(self.guard(task_id, generation)),
            Claim::Joined(_) => None,
        }
    }

    pub(crate) fn guard(&self, task_id: &str, generation: u64) -> ActiveGuard {
        ActiveGuard {
            active: self.clone(),
            task_id: task_id.to_string(),
            generation,
        }
    }

    /// Remove the task's entry only if it is still the given generation.
    pub(crate) fn release(&self, task_id: &str, generation: u64) -> bool {
        let mut entries = self.lock();
        if entries
            .get(task_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.remove(task_id);
            true
        } else {
            false
        }
    }
}

/// Releases a claim when dropped, including on early return, panic, or
/// cancellation of the owning future.
pub(crate) struct ActiveGuard {
    active: ActiveReviews,
    task_id: String,
    generation: u64,
}

impl ActiveGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.release(&self.task_id, self.generation);
    }
}

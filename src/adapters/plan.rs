//! Plan state kept in `.gatekeeper/plan.json`.
//!
//! ```json
//! { "tasks": [ { "id": "T1", "title": "Login", "status": "awaiting-review" } ] }
//! ```
//!
//! The store serves one project. Reads go to disk every time so edits made by
//! other tools are picked up; writes replace the file through a temporary
//! sibling and a rename.

use crate::ports::{PlanSource, PlanStatusSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use gatekeeper_common::{Project, Task};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl PlanFile {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }
}

pub struct JsonPlanStore {
    project: Project,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonPlanStore {
    pub fn new(project: Project, path: impl Into<PathBuf>) -> Self {
        Self {
            project,
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the plan. A missing file is an empty plan.
    pub async fn load(&self) -> Result<PlanFile> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PlanFile::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read plan file: {}", self.path.display()));
            }
        };
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse plan file: {}", self.path.display()))
    }

    pub async fn save(&self, plan: &PlanFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace plan file: {}", self.path.display()))?;
        Ok(())
    }

    /// Copy the task's status and revision counter into the plan.
    pub async fn record_status(&self, task: &Task) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut plan = self.load().await?;
        let entry = plan
            .tasks
            .iter_mut()
            .find(|existing| existing.id == task.id)
            .with_context(|| format!("Task {} is not in the plan", task.id))?;
        entry.status = task.status;
        entry.revision_count = task.revision_count;
        self.save(&plan).await
    }
}

#[async_trait]
impl PlanSource for JsonPlanStore {
    async fn project(&self, project_id: &str) -> Option<Project> {
        (self.project.id == project_id).then(|| self.project.clone())
    }

    async fn task(&self, project_id: &str, task_id: &str) -> Option<Task> {
        if self.project.id != project_id {
            return None;
        }
        match self.load().await {
            Ok(plan) => plan.task(task_id).cloned(),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Plan unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl PlanStatusSink for JsonPlanStore {
    async fn update_task_status(&self, project_id: &str, task: &Task) {
        if self.project.id != project_id {
            warn!(project_id, task_id = %task.id, "Status update for a project this plan does not hold");
            return;
        }
        match self.record_status(task).await {
            Ok(()) => debug!(task_id = %task.id, status = %task.status, "Plan updated"),
            Err(e) => warn!(task_id = %task.id, error = %format!("{:#}", e), "Failed to update plan"),
        }
    }
}

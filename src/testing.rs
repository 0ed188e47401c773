//! In-memory fakes for every collaborator port.

use crate::ports::{
    DiffProvider, Notification, Notifier, PlanSource, PlanStatusSink, SessionInfo, SessionRole,
    SessionSpawner, ShellOutcome, ShellRunner, SpawnOptions, SpawnOutcome,
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use gatekeeper_common::{Project, Task};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// =========================================
// Diff
// =========================================

pub struct FixedDiffProvider {
    result: std::result::Result<String, String>,
    calls: AtomicUsize,
    last_base_branch: Mutex<Option<String>>,
}

impl FixedDiffProvider {
    pub fn ok(diff: &str) -> Self {
        Self::with_result(Ok(diff.to_string()))
    }

    pub fn err(error: &str) -> Self {
        Self::with_result(Err(error.to_string()))
    }

    fn with_result(result: std::result::Result<String, String>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            last_base_branch: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_base_branch(&self) -> Option<String> {
        self.last_base_branch.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiffProvider for FixedDiffProvider {
    async fn diff(&self, _path: &Path, _staged_only: bool, base_branch: Option<&str>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_base_branch.lock().unwrap() = base_branch.map(str::to_string);
        match &self.result {
            Ok(diff) => Ok(diff.clone()),
            Err(e) => bail!("{}", e),
        }
    }
}

// =========================================
// Shell
// =========================================

/// Answers scripted commands; anything else fails.
#[derive(Default)]
pub struct ScriptedShellRunner {
    scripts: HashMap<String, ShellOutcome>,
    commands: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, command: &str, outcome: ShellOutcome) -> Self {
        self.scripts.insert(command.to_string(), outcome);
        self
    }

    /// Commands run so far with their timeouts.
    pub fn commands(&self) -> Vec<(String, Duration)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShellRunner for ScriptedShellRunner {
    async fn run(&self, command: &str, _working_dir: &Path, timeout: Duration) -> ShellOutcome {
        self.commands
            .lock()
            .unwrap()
            .push((command.to_string(), timeout));
        self.scripts
            .get(command)
            .cloned()
            .unwrap_or_else(|| ShellOutcome::Failed {
                reason: format!("unscripted command: {}", command),
            })
    }
}

// =========================================
// Sessions
// =========================================

enum Script {
    Reply(String),
    SpawnFails(String),
    OutputFails(String),
}

/// Spawner whose sessions answer with a fixed reply.
///
/// A gated spawner holds every `await_output` until [`release`](Self::release).
pub struct ScriptedSpawner {
    script: Script,
    gated: bool,
    gate: Arc<Notify>,
    next_id: AtomicUsize,
    waiting: AtomicUsize,
    sessions: Mutex<HashMap<String, SessionInfo>>,
    spawn_requests: Mutex<Vec<SpawnOptions>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSpawner {
    fn scripted(script: Script) -> Self {
        Self {
            script,
            gated: false,
            gate: Arc::new(Notify::new()),
            next_id: AtomicUsize::new(1),
            waiting: AtomicUsize::new(0),
            sessions: Mutex::new(HashMap::new()),
            spawn_requests: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(output: &str) -> Self {
        Self::scripted(Script::Reply(output.to_string()))
    }

    pub fn failing_spawn(error: &str) -> Self {
        Self::scripted(Script::SpawnFails(error.to_string()))
    }

    pub fn failing_output(error: &str) -> Self {
        Self::scripted(Script::OutputFails(error.to_string()))
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    /// Let one waiting (or the next) `await_output` through.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Reviewers currently blocked in `await_output`.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn spawn_requests(&self) -> Vec<SpawnOptions> {
        self.spawn_requests.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

/// Counts a reviewer out again, including when its future is dropped.
struct Waiting<'a>(&'a AtomicUsize);

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionSpawner for ScriptedSpawner {
    async fn spawn(&self, project: &Project, options: SpawnOptions) -> SpawnOutcome {
        self.spawn_requests.lock().unwrap().push(options.clone());
        if let Script::SpawnFails(error) = &self.script {
            return SpawnOutcome::failed(error.clone());
        }

        let id = format!("session-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sessions.lock().unwrap().insert(
            id.clone(),
            SessionInfo {
                id: id.clone(),
                project_id: project.id.clone(),
                command: options.command,
                role: SessionRole::Worker,
                task_id: None,
            },
        );
        SpawnOutcome::started(id)
    }

    async fn session(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    async fn tag_session(&self, session_id: &str, role: SessionRole, task_id: &str) -> bool {
        match self.sessions.lock().unwrap().get_mut(session_id) {
            Some(info) => {
                info.role = role;
                info.task_id = Some(task_id.to_string());
                true
            }
            None => false,
        }
    }

    async fn sessions_for_project(&self, project_id: &str) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|info| info.project_id == project_id)
            .cloned()
            .collect()
    }

    async fn send_prompt(&self, session_id: &str, prompt: &str) -> Result<()> {
        if !self.sessions.lock().unwrap().contains_key(session_id) {
            bail!("unknown session {}", session_id);
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(())
    }

    async fn await_output(&self, _session_id: &str) -> Result<String> {
        if self.gated {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let _waiting = Waiting(&self.waiting);
            self.gate.notified().await;
        }
        match &self.script {
            Script::Reply(output) => Ok(output.clone()),
            Script::OutputFails(error) => bail!("{}", error),
            Script::SpawnFails(error) => bail!("no session: {}", error),
        }
    }
}

// =========================================
// Notifier and plan
// =========================================

pub struct RecordingNotifier {
    deliverable: bool,
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            deliverable: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Records notifications but reports them as undelivered.
    pub fn undeliverable() -> Self {
        Self {
            deliverable: false,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        self.sent.lock().unwrap().push(notification.clone());
        self.deliverable
    }
}

#[derive(Default)]
pub struct RecordingPlanSink {
    updates: Mutex<Vec<(String, Task)>>,
}

impl RecordingPlanSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(project_id, task)` pairs in call order.
    pub fn updates(&self) -> Vec<(String, Task)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlanStatusSink for RecordingPlanSink {
    async fn update_task_status(&self, project_id: &str, task: &Task) {
        self.updates
            .lock()
            .unwrap()
            .push((project_id.to_string(), task.clone()));
    }
}

#[derive(Default)]
pub struct InMemoryPlan {
    projects: HashMap<String, Project>,
    tasks: HashMap<(String, String), Task>,
}

impl InMemoryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.projects.insert(project.id.clone(), project);
        self
    }

    pub fn with_task(mut self, project_id: &str, task: Task) -> Self {
        self.tasks
            .insert((project_id.to_string(), task.id.clone()), task);
        self
    }
}

#[async_trait]
impl PlanSource for InMemoryPlan {
    async fn project(&self, project_id: &str) -> Option<Project> {
        self.projects.get(project_id).cloned()
    }

    async fn task(&self, project_id: &str, task_id: &str) -> Option<Task> {
        self.tasks
            .get(&(project_id.to_string(), task_id.to_string()))
            .cloned()
    }
}

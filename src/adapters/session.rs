//! Reviewer sessions backed by plain child processes.
//!
//! The reviewer command runs under `sh -c` in the project directory. The
//! prompt goes to its stdin, which is then closed; end of stdout is the
//! agent's "done" signal.
//!
//! The prompt is written from its own task while output is being read, so a
//! reviewer that prints before it has consumed its input cannot stall on a
//! full pipe. A session is forgotten once its output has been collected.

use crate::ports::{SessionInfo, SessionRole, SessionSpawner, SpawnOptions, SpawnOutcome};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use gatekeeper_common::Project;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

struct SessionRecord {
    info: SessionInfo,
    child: Child,
    /// Feeds the prompt to the child's stdin.
    writer: Option<JoinHandle<std::io::Result<()>>>,
}

#[derive(Default)]
pub struct ProcessSessionSpawner {
    sessions: Arc<Mutex<HashMap<String, SessionRecord>>>,
}

impl ProcessSessionSpawner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionSpawner for ProcessSessionSpawner {
    async fn spawn(&self, project: &Project, options: SpawnOptions) -> SpawnOutcome {
        let child = Command::new("sh")
            .arg("-c")
            .arg(&options.command)
            .current_dir(&options.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return SpawnOutcome::failed(format!(
                    "Failed to spawn '{}' in {}: {}",
                    options.command,
                    options.working_dir.display(),
                    e
                ));
            }
        };

        let id = Uuid::new_v4().to_string();
        info!(session_id = %id, project_id = %project.id, command = %options.command, "Session spawned");

        self.sessions.lock().await.insert(
            id.clone(),
            SessionRecord {
                info: SessionInfo {
                    id: id.clone(),
                    project_id: project.id.clone(),
                    command: options.command,
                    role: SessionRole::Worker,
                    task_id: None,
                },
                child,
                writer: None,
            },
        );

        SpawnOutcome::started(id)
    }

    async fn session(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|record| record.info.clone())
    }

    async fn tag_session(&self, session_id: &str, role: SessionRole, task_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(record) = sessions.get_mut(session_id) else {
            return false;
        };
        record.info.role = role;
        record.info.task_id = Some(task_id.to_string());
        true
    }

    async fn sessions_for_project(&self, project_id: &str) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .lock()
            .await
            .values()
            .filter(|record| record.info.project_id == project_id)
            .map(|record| record.info.clone())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    async fn send_prompt(&self, session_id: &str, prompt: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("Unknown session {}", session_id))?;
        let mut stdin = record
            .child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Session {} is not accepting input", session_id))?;

        let prompt = prompt.to_owned();
        debug!(session_id, bytes = prompt.len(), "Sending prompt");
        record.writer = Some(tokio::spawn(async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        }));
        Ok(())
    }

    async fn await_output(&self, session_id: &str) -> Result<String> {
        let record = self
            .sessions
            .lock()
            .await
            .remove(session_id)
            .ok_or_else(|| anyhow!("Unknown session {}", session_id))?;

        let output = record
            .child
            .wait_with_output()
            .await
            .context("Failed to wait for reviewer")?;

        if let Some(writer) = record.writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(session_id, "Reviewer exited before reading the whole prompt");
                }
                Ok(Err(e)) => return Err(e).context("Failed to write prompt to reviewer"),
                Err(e) => bail!("Prompt writer for session {} failed: {}", session_id, e),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Reviewer exited with {}: {}", output.status, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

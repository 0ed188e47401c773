use crate::ports::{ShellOutcome, ShellRunner};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Runs commands through `sh -c`. A command that outlives its timeout is
/// killed when its handle drops.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioShellRunner;

impl TokioShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ShellRunner for TokioShellRunner {
    async fn run(&self, command: &str, working_dir: &Path, limit: Duration) -> ShellOutcome {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return ShellOutcome::Failed {
                    reason: format!("Failed to spawn '{}': {}", command, e),
                };
            }
        };

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ShellOutcome::Failed {
                    reason: format!("Failed to wait for '{}': {}", command, e),
                };
            }
            Err(_) => return ShellOutcome::TimedOut { after: limit },
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        debug!(command, code = output.status.code().unwrap_or(-1), "Shell command finished");

        ShellOutcome::Completed {
            output: text,
            success: output.status.success(),
        }
    }
}

use crate::ports::{Notification, NotificationSound, Notifier};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

/// Desktop notifications through `osascript` on macOS and `notify-send`
/// elsewhere. Failures are logged and reported as undelivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }
}

fn applescript_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// AppleScript for `osascript -e`.
pub fn osascript_script(notification: &Notification) -> String {
    let mut script = format!(
        "display notification {} with title {}",
        applescript_quote(&notification.message),
        applescript_quote(&notification.title)
    );
    if let Some(subtitle) = &notification.subtitle {
        script.push_str(&format!(" subtitle {}", applescript_quote(subtitle)));
    }
    if let Some(sound) = notification.sound {
        script.push_str(&format!(" sound name {}", applescript_quote(sound.system_name())));
    }
    script
}

/// Arguments for `notify-send`.
pub fn notify_send_args(notification: &Notification) -> Vec<String> {
    let urgency = match notification.sound {
        Some(NotificationSound::Failure) => "critical",
        _ => "normal",
    };
    let body = match &notification.subtitle {
        Some(subtitle) => format!("{}\n{}", subtitle, notification.message),
        None => notification.message.clone(),
    };
    vec![
        "--app-name=gatekeeper".to_string(),
        format!("--urgency={}", urgency),
        notification.title.clone(),
        body,
    ]
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        let mut command = if cfg!(target_os = "macos") {
            let mut command = Command::new("osascript");
            command.arg("-e").arg(osascript_script(notification));
            command
        } else {
            let mut command = Command::new("notify-send");
            command.args(notify_send_args(notification));
            command
        };

        match command.output().await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                warn!(
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Desktop notification failed"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "Desktop notifier unavailable");
                false
            }
        }
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        info!(
            title = %notification.title,
            subtitle = notification.subtitle.as_deref().unwrap_or(""),
            "{}",
            notification.message
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escalation() -> Notification {
        Notification::new("Review Failed: Login", "Failed after 3 attempts: \"tests\" missing")
            .with_subtitle("Task T1 · attempt 3")
            .with_sound(NotificationSound::Failure)
    }

    #[test]
    fn test_osascript_script_escapes_quotes() {
        let script = osascript_script(&escalation());
        assert_eq!(
            script,
            "display notification \"Failed after 3 attempts: \\\"tests\\\" missing\" \
             with title \"Review Failed: Login\" subtitle \"Task T1 · attempt 3\" \
             sound name \"Basso\""
        );
    }

    #[test]
    fn test_osascript_script_minimal() {
        let script = osascript_script(&Notification::new("t", "m"));
        assert_eq!(script, "display notification \"m\" with title \"t\"");
    }

    #[test]
    fn test_notify_send_args_mark_failures_critical() {
        let args = notify_send_args(&escalation());
        assert_eq!(args[1], "--urgency=critical");
        assert_eq!(args[2], "Review Failed: Login");
        assert!(args[3].starts_with("Task T1 · attempt 3\n"));

        let plain = notify_send_args(&Notification::new("t", "m"));
        assert_eq!(plain[1], "--urgency=normal");
        assert_eq!(plain[3], "m");
    }

    #[tokio::test]
    async fn test_log_notifier_always_delivers() {
        assert!(LogNotifier.notify(&escalation()).await);
    }
}

//! System notification dispatch
//!
//! Not part of the distilled spec's core algorithm, but required by the
//! Alert Engine's "dispatch a system notification" step (§4.10): a small
//! platform-gated seam with a macOS fallback chain (`terminal-notifier`,
//! then `osascript`) and a Linux path (`notify-send`), each invocation
//! carrying its own timeout in line with the rest of the external-tool
//! calls in this workspace.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a notification. `urgent` requests a modal/high-urgency
    /// presentation where the platform supports it; callers degrade to a
    /// plain banner otherwise.
    async fn notify(&self, title: &str, message: &str, urgent: bool);
}

#[cfg(target_os = "macos")]
pub struct MacNotifier;

#[cfg(target_os = "macos")]
#[async_trait]
impl Notifier for MacNotifier {
    async fn notify(&self, title: &str, message: &str, urgent: bool) {
        let sent = run(
            Command::new("terminal-notifier")
                .args(["-title", title, "-message", message])
                .args(if urgent { vec!["-sound", "default"] } else { vec![] }),
        )
        .await;

        if !sent {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape_applescript(message),
                escape_applescript(title)
            );
            run(Command::new("osascript").args(["-e", &script])).await;
        }
    }
}

#[cfg(target_os = "linux")]
pub struct LinuxNotifier;

#[cfg(target_os = "linux")]
#[async_trait]
impl Notifier for LinuxNotifier {
    async fn notify(&self, title: &str, message: &str, urgent: bool) {
        let urgency = if urgent { "critical" } else { "normal" };
        run(Command::new("notify-send").args(["-u", urgency, title, message])).await;
    }
}

/// No-op notifier for platforms without a notification backend, and for
/// tests that should not shell out.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, title: &str, message: &str, _urgent: bool) {
        tracing::debug!("notification suppressed (no backend): {title}: {message}");
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
async fn run(cmd: &mut Command) -> bool {
    match timeout(NOTIFY_TIMEOUT, cmd.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::warn!("notification command failed to spawn: {e}");
            false
        }
        Err(_) => {
            tracing::warn!("notification command timed out");
            false
        }
    }
}

/// Build a platform-appropriate notifier. Returns [`NoopNotifier`] on
/// platforms this workspace has no native backend for.
pub fn platform_notifier() -> Box<dyn Notifier> {
    #[cfg(target_os = "macos")]
    {
        Box::new(MacNotifier)
    }
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxNotifier)
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Box::new(NoopNotifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_notifier_never_panics() {
        NoopNotifier.notify("title", "message", true).await;
    }
}

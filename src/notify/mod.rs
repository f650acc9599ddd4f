//! Run notifications
//!
//! Configurations can ask to be notified on start, success, and failure.
//! Delivery is fire-and-forget: the orchestrator spawns the notifier call
//! and never lets a slow or broken channel affect the run outcome.

use async_trait::async_trait;

use crate::core::run::RunStatus;

/// What happened to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Started,
    Succeeded,
    Failed,
}

impl NotificationKind {
    /// The kind describing a terminal run status, if any
    pub fn for_status(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Success => Some(NotificationKind::Succeeded),
            RunStatus::Failed | RunStatus::TimedOut => Some(NotificationKind::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationKind::Started => "started",
            NotificationKind::Succeeded => "succeeded",
            NotificationKind::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A notification about one run of one configuration
#[derive(Debug, Clone)]
pub struct BuildNotification {
    pub configuration_id: String,
    pub build_number: u64,
    pub kind: NotificationKind,
    pub recipients: Vec<String>,
}

/// Delivery channel for build notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: BuildNotification);
}

/// Notifier that writes to the structured log; the default channel
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: BuildNotification) {
        tracing::info!(
            "Build #{} of '{}' {} (notifying {})",
            notification.build_number,
            notification.configuration_id,
            notification.kind,
            notification.recipients.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_terminal_status() {
        assert_eq!(
            NotificationKind::for_status(RunStatus::Success),
            Some(NotificationKind::Succeeded)
        );
        assert_eq!(
            NotificationKind::for_status(RunStatus::Failed),
            Some(NotificationKind::Failed)
        );
        assert_eq!(
            NotificationKind::for_status(RunStatus::TimedOut),
            Some(NotificationKind::Failed)
        );
        assert_eq!(NotificationKind::for_status(RunStatus::Skipped), None);
        assert_eq!(NotificationKind::for_status(RunStatus::Running), None);
    }
}

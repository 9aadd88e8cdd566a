//! Notification backends for move failures and other user-facing notices

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::board::MoveError;

/// Notification backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationBackend {
    /// No notifications
    None,
    /// Written to the log file only
    #[default]
    Log,
    /// System notifications only (via notify-rust)
    System,
    /// Both log and system notifications
    Both,
}

impl NotificationBackend {
    /// Parse backend from settings value (case-insensitive)
    pub fn from_settings_value(s: &str) -> Option<Self> {
        Self::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Log => "log",
            Self::System => "system",
            Self::Both => "both",
        }
    }

    fn targets(self) -> (bool, bool) {
        match self {
            Self::None => (false, false),
            Self::Log => (true, false),
            Self::System => (false, true),
            Self::Both => (true, true),
        }
    }
}

impl FromStr for NotificationBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "log" => Ok(Self::Log),
            "system" => Ok(Self::System),
            "both" => Ok(Self::Both),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub summary: String,
    pub body: String,
}

impl Notice {
    pub fn new(summary: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            body: body.into(),
        }
    }

    pub fn move_failed(err: &MoveError) -> Self {
        let summary = match err {
            MoveError::Rejected { .. } => "Move rejected",
            MoveError::Conflict { .. } => "Move conflicted",
            MoveError::Timeout { .. } => "Move timed out",
            MoveError::Network { .. } => "Move failed",
            MoveError::UnknownTask(_) | MoveError::UnknownColumn(_) => "Move not possible",
        };
        Self::new(summary, err.to_string())
    }
}

/// Sink for user-facing notices. Implementations must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, Copy)]
pub struct BackendNotifier {
    backend: NotificationBackend,
    display_duration_ms: u64,
}

impl BackendNotifier {
    pub fn new(backend: NotificationBackend, display_duration_ms: u64) -> Self {
        Self {
            backend,
            display_duration_ms,
        }
    }

    pub fn backend(&self) -> NotificationBackend {
        self.backend
    }
}

impl Notifier for BackendNotifier {
    fn notify(&self, notice: Notice) {
        let (send_log, send_system) = self.backend.targets();
        if !send_log && !send_system {
            debug!(summary = %notice.summary, "notification skipped (backend is none)");
            return;
        }
        if send_log {
            warn!(summary = %notice.summary, body = %notice.body, "notice");
        }
        if send_system {
            let timeout_ms = self.display_duration_ms.min(u32::MAX as u64) as u32;
            // Desktop notification daemons can stall; never make the caller wait.
            std::thread::spawn(move || send_system_notification(&notice, timeout_ms));
        }
    }
}

/// Keeps every notice in memory. Used by the replay command and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

fn send_system_notification(notice: &Notice, timeout_ms: u32) {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        debug!(summary = %notice.summary, timeout_ms, "sending system notification");

        let notification_result = notify_rust::Notification::new()
            .summary(&format!("Swimlane: {}", notice.summary))
            .body(&notice.body)
            .icon("dialog-warning")
            .timeout(notify_rust::Timeout::Milliseconds(timeout_ms))
            .show();

        match notification_result {
            Ok(_) => debug!("system notification sent successfully"),
            Err(err) => warn!(error = %err, "failed to send system notification"),
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = timeout_ms;
        debug!(summary = %notice.summary, "system notifications not supported on this OS");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_notification_backend_from_str() {
        assert_eq!(
            NotificationBackend::from_settings_value("log"),
            Some(NotificationBackend::Log)
        );
        assert_eq!(
            NotificationBackend::from_settings_value(" System "),
            Some(NotificationBackend::System)
        );
        assert_eq!(
            NotificationBackend::from_settings_value("BOTH"),
            Some(NotificationBackend::Both)
        );
        assert_eq!(
            NotificationBackend::from_settings_value("none"),
            Some(NotificationBackend::None)
        );
        assert_eq!(NotificationBackend::from_settings_value("pager"), None);
    }

    #[test]
    fn test_backend_round_trips_through_as_str() {
        for backend in [
            NotificationBackend::None,
            NotificationBackend::Log,
            NotificationBackend::System,
            NotificationBackend::Both,
        ] {
            assert_eq!(
                NotificationBackend::from_settings_value(backend.as_str()),
                Some(backend)
            );
        }
    }

    #[test]
    fn test_move_failure_notice_names_the_task() {
        let notice = Notice::move_failed(&MoveError::Timeout {
            task_id: "t1".into(),
            after: Duration::from_secs(3),
        });
        assert_eq!(notice.summary, "Move timed out");
        assert!(notice.body.contains("t1"));
    }

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::default();
        notifier.notify(Notice::new("a", "first"));
        notifier.notify(Notice::new("b", "second"));
        let summaries: Vec<_> = notifier
            .notices()
            .into_iter()
            .map(|notice| notice.summary)
            .collect();
        assert_eq!(summaries, vec!["a", "b"]);
    }

    #[test]
    fn test_none_backend_is_silent() {
        BackendNotifier::new(NotificationBackend::None, 1000).notify(Notice::new("x", "y"));
    }
}

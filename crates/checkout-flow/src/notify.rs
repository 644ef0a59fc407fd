//! Cashier-facing notifications.
//!
//! Every recoverable error and every completed milestone becomes a [`Notice`]
//! handed to a [`FlowNotifier`]. The desktop shell renders them as toasts;
//! [`TracingNotifier`] only logs them.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::FlowError;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One message for the cashier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Show a retry affordance.
    pub retryable: bool,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Success,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Warning,
            message: message.into(),
            retryable: false,
        }
    }

    /// Display problems are warnings; everything else is an error.
    pub fn from_error(err: &FlowError) -> Self {
        let level = match err {
            FlowError::Protocol(_) => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        Notice {
            level,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Receives notices (implemented by the desktop shell).
pub trait FlowNotifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log.
pub struct TracingNotifier;

impl FlowNotifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => info!(notice = %notice.message),
            NoticeLevel::Warning => warn!(notice = %notice.message, retryable = notice.retryable),
            NoticeLevel::Error => error!(notice = %notice.message, retryable = notice.retryable),
        }
    }
}

/// Keeps every notice in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices().pop()
    }

    pub fn count(&self, level: NoticeLevel) -> usize {
        self.notices().iter().filter(|n| n.level == level).count()
    }
}

impl FlowNotifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use checkout_display::DisplayError;

    #[test]
    fn test_notice_from_error() {
        let notice = Notice::from_error(&FlowError::network(
            "order backend",
            CollaboratorError::Unavailable("connection refused".into()),
        ));
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.retryable);
        assert!(notice.message.contains("order backend"));

        let notice = Notice::from_error(&FlowError::Protocol(DisplayError::RetriesExhausted {
            attempts: 4,
        }));
        assert_eq!(notice.level, NoticeLevel::Warning);
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notice::info("a"));
        notifier.notify(Notice::warning("b"));
        notifier.notify(Notice::success("c"));

        assert_eq!(notifier.notices().len(), 3);
        assert_eq!(notifier.count(NoticeLevel::Warning), 1);
        assert_eq!(notifier.last().map(|n| n.message), Some("c".to_string()));
    }
}

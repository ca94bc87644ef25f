//! Notification error types.

use thiserror::Error;

/// Errors that can occur while showing or closing notifications.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The user or platform refused notification permission.
    #[error("notification permission denied")]
    PermissionDenied,

    /// Failed to show a notification.
    #[error("failed to show notification: {0}")]
    SendFailed(String),

    /// Failed to close a notification.
    #[error("failed to close notification: {0}")]
    CloseFailed(String),

    /// The notification request was malformed.
    #[error("invalid notification: {0}")]
    InvalidInput(String),

    /// No notification mechanism is available.
    #[error("notifications are not available")]
    NotAvailable,
}

impl NotificationError {
    /// Returns true if this error is related to permissions.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "allow notifications in the system settings",
            Self::SendFailed(_) | Self::CloseFailed(_) => "check the notification service",
            Self::InvalidInput(_) => "check the alarm label",
            Self::NotAvailable => "alarms still ring without notifications",
        }
    }
}

//! Notification payloads.

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::error::NotificationError;

/// Title of every alarm notification.
pub const ALARM_TITLE: &str = "Alarm!";

/// Maximum length for labels in notification bodies.
const MAX_LABEL_LENGTH: usize = 100;

/// A notification to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    /// Replaces any earlier notification with the same tag.
    pub tag: String,
    /// Keep the notification until the user dismisses it.
    pub require_interaction: bool,
}

impl NotificationRequest {
    /// Builds the notification for a ringing alarm.
    ///
    /// The body is the alarm label, or the alarm time when the label is
    /// empty.
    #[must_use]
    pub fn for_alarm(id: Uuid, label: &str, time: NaiveDateTime) -> Self {
        let body = sanitize_label(label)
            .unwrap_or_else(|| format!("Alarm time: {}", time.format("%H:%M")));

        Self {
            title: ALARM_TITLE.to_string(),
            body,
            tag: alarm_tag(id),
            require_interaction: true,
        }
    }

    /// Checks that the request can be shown.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::InvalidInput` if the title or tag is empty.
    pub fn validate(&self) -> Result<(), NotificationError> {
        if self.title.trim().is_empty() {
            return Err(NotificationError::InvalidInput("empty title".to_string()));
        }
        if self.tag.is_empty() {
            return Err(NotificationError::InvalidInput("empty tag".to_string()));
        }
        Ok(())
    }
}

/// Handle to a shown notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationHandle {
    pub tag: String,
}

/// Notification tag for an alarm.
#[must_use]
pub fn alarm_tag(id: Uuid) -> String {
    format!("alarm-{}", id)
}

/// Truncates and strips control characters from a label.
///
/// Returns `None` if nothing printable remains.
#[must_use]
pub fn sanitize_label(label: &str) -> Option<String> {
    let sanitized: String = label
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_LABEL_LENGTH)
        .collect();
    let trimmed = sanitized.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

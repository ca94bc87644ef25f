//! Alarm notifications.
//!
//! [`NotificationBridge`] turns ringing transitions into notifications
//! through a [`Notifier`]:
//!
//! - one outstanding notification per ringing alarm, tagged `alarm-<id>`
//! - dismissed when the alarm stops ringing
//! - everything closed on teardown
//! - permission requested once; a denial turns notifications off
//!
//! Notifier failures are logged and never affect alarm state.

mod bridge;
pub mod error;
mod request;

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::debug;

pub use self::bridge::NotificationBridge;
pub use self::error::NotificationError;
pub use self::request::{
    alarm_tag, sanitize_label, NotificationHandle, NotificationRequest, ALARM_TITLE,
};

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Platform notification surface.
pub trait Notifier: Send + Sync {
    /// Asks the platform for permission to show notifications.
    fn request_permission(&self) -> Permission;

    /// Shows a notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be shown.
    fn show(&self, request: &NotificationRequest) -> Result<NotificationHandle, NotificationError>;

    /// Closes a shown notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be closed.
    fn close(&self, handle: &NotificationHandle) -> Result<(), NotificationError>;

    fn is_available(&self) -> bool;
}

/// Notifier that prints to stdout, for the foreground `run` command.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for ConsoleNotifier {
    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, request: &NotificationRequest) -> Result<NotificationHandle, NotificationError> {
        request.validate()?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "🔔 {}  {}", request.title, request.body)
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;
        Ok(NotificationHandle {
            tag: request.tag.clone(),
        })
    }

    fn close(&self, handle: &NotificationHandle) -> Result<(), NotificationError> {
        debug!(tag = %handle.tag, "Console notification dismissed");
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Mock notifier for testing.
#[derive(Debug)]
pub struct MockNotifier {
    shown: Mutex<Vec<NotificationRequest>>,
    closed: Mutex<Vec<String>>,
    permission: Mutex<Permission>,
    permission_requests: AtomicUsize,
    available: AtomicBool,
    should_fail: AtomicBool,
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shown: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            permission: Mutex::new(Permission::Granted),
            permission_requests: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn set_permission(&self, permission: Permission) {
        *self.permission.lock().unwrap() = permission;
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn shown(&self) -> Vec<NotificationRequest> {
        self.shown.lock().unwrap().clone()
    }

    #[must_use]
    pub fn shown_count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }

    /// Tags of closed notifications, in order.
    #[must_use]
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    #[must_use]
    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn clear_recorded(&self) {
        self.shown.lock().unwrap().clear();
        self.closed.lock().unwrap().clear();
    }
}

impl Notifier for MockNotifier {
    fn request_permission(&self) -> Permission {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        *self.permission.lock().unwrap()
    }

    fn show(&self, request: &NotificationRequest) -> Result<NotificationHandle, NotificationError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(NotificationError::SendFailed("Mock failure".to_string()));
        }
        self.shown.lock().unwrap().push(request.clone());
        Ok(NotificationHandle {
            tag: request.tag.clone(),
        })
    }

    fn close(&self, handle: &NotificationHandle) -> Result<(), NotificationError> {
        self.closed.lock().unwrap().push(handle.tag.clone());
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn request() -> NotificationRequest {
        let time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(6, 45, 0)
            .unwrap();
        NotificationRequest::for_alarm(Uuid::new_v4(), "Coffee", time)
    }

    #[test]
    fn test_console_notifier() {
        let notifier = ConsoleNotifier::new();
        assert_eq!(notifier.request_permission(), Permission::Granted);
        assert!(notifier.is_available());

        let req = request();
        let handle = notifier.show(&req).unwrap();
        assert_eq!(handle.tag, req.tag);
        assert!(notifier.close(&handle).is_ok());
    }

    #[test]
    fn test_mock_records_calls() {
        let notifier = MockNotifier::new();
        let handle = notifier.show(&request()).unwrap();
        notifier.close(&handle).unwrap();

        assert_eq!(notifier.shown_count(), 1);
        assert_eq!(notifier.closed(), vec![handle.tag]);

        notifier.clear_recorded();
        assert_eq!(notifier.shown_count(), 0);
    }

    #[test]
    fn test_mock_failure() {
        let notifier = MockNotifier::new();
        notifier.set_should_fail(true);
        assert!(notifier.show(&request()).is_err());
        assert_eq!(notifier.shown_count(), 0);
    }
}

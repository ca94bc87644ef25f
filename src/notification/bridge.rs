//! Maps alarm ringing transitions to notifications.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::request::{NotificationHandle, NotificationRequest};
use super::{Notifier, Permission};
use crate::alarm::{Alarm, AlarmEvent};

/// Keeps at most one notification per ringing alarm.
pub struct NotificationBridge {
    notifier: Arc<dyn Notifier>,
    enabled: bool,
    permission: Option<Permission>,
    outstanding: HashMap<Uuid, NotificationHandle>,
}

impl NotificationBridge {
    /// Creates a bridge. Permission is requested on first use.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, enabled: bool) -> Self {
        Self {
            notifier,
            enabled,
            permission: None,
            outstanding: HashMap::new(),
        }
    }

    /// Enables or disables future notifications.
    ///
    /// Enabling asks for permission once; if it is denied notifications stay
    /// off. Returns the effective state. Disabling leaves shown
    /// notifications in place.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        self.enabled = enabled && self.ensure_permission();
        self.enabled
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Shows or dismisses the notification for `alarm`.
    pub fn on_ringing_changed(&mut self, alarm: &Alarm, ringing: bool) {
        if ringing {
            self.show(alarm.id, &alarm.label, alarm.time);
        } else {
            self.dismiss(alarm.id);
        }
    }

    /// Follows an engine event.
    pub fn handle_event(&mut self, event: &AlarmEvent) {
        match event {
            AlarmEvent::Ringing {
                id, label, time, ..
            } => self.show(*id, label, *time),
            AlarmEvent::Silenced { id } | AlarmEvent::Snoozed { id, .. } => self.dismiss(*id),
        }
    }

    /// Shows the notification for a ringing alarm unless one is already out.
    pub fn show(&mut self, id: Uuid, label: &str, time: NaiveDateTime) {
        if !self.enabled || self.outstanding.contains_key(&id) {
            return;
        }
        if !self.ensure_permission() {
            self.enabled = false;
            return;
        }

        let request = NotificationRequest::for_alarm(id, label, time);
        match self.notifier.show(&request) {
            Ok(handle) => {
                debug!(alarm = %id, "Notification shown");
                self.outstanding.insert(id, handle);
            }
            Err(e) => warn!(alarm = %id, "Failed to show notification: {}", e),
        }
    }

    /// Closes and forgets the notification for `id`, if any.
    pub fn dismiss(&mut self, id: Uuid) {
        if let Some(handle) = self.outstanding.remove(&id) {
            self.close(&handle);
        }
    }

    /// Closes every outstanding notification.
    pub fn close_all(&mut self) {
        for (_, handle) in std::mem::take(&mut self.outstanding) {
            self.close(&handle);
        }
    }

    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    #[must_use]
    pub fn has_notification(&self, id: Uuid) -> bool {
        self.outstanding.contains_key(&id)
    }

    fn close(&self, handle: &NotificationHandle) {
        if let Err(e) = self.notifier.close(handle) {
            debug!(tag = %handle.tag, "Failed to close notification: {}", e);
        }
    }

    fn ensure_permission(&mut self) -> bool {
        if !self.notifier.is_available() {
            return false;
        }
        let permission = match self.permission {
            Some(permission) => permission,
            None => {
                let permission = self.notifier.request_permission();
                if permission == Permission::Denied {
                    warn!("Notification permission denied; notifications disabled");
                }
                self.permission = Some(permission);
                permission
            }
        };
        permission == Permission::Granted
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("enabled", &self.enabled)
            .field("permission", &self.permission)
            .field("outstanding", &self.outstanding.len())
            .finish_non_exhaustive()
    }
}

//! Alarm data types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::{is_known_sound, DEFAULT_SOUND};

pub const DEFAULT_SNOOZE_MINUTES: u32 = 10;
pub const MIN_SNOOZE_MINUTES: u32 = 1;
pub const MAX_SNOOZE_MINUTES: u32 = 60;
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Suffix appended to the label of a duplicated alarm.
pub const COPY_SUFFIX: &str = " (copy)";

/// Common wake-up times offered as presets.
pub const PRESET_TIMES: [(u32, u32); 8] = [
    (5, 0),
    (5, 30),
    (6, 0),
    (6, 30),
    (7, 0),
    (7, 30),
    (8, 0),
    (8, 30),
];

/// Clamps a volume to `[0, 1]`, mapping NaN to 0.
#[must_use]
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// A single alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: Uuid,
    pub time: NaiveDateTime,
    pub is_active: bool,
    pub sound: String,
    pub volume: f32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub is_ringing: bool,
    pub created_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<NaiveDateTime>,
    #[serde(default)]
    pub snooze_count: u32,
    #[serde(default)]
    pub is_recurring: bool,
    /// Weekdays, 0 (Sunday) through 6.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurring_days: Vec<u8>,
}

impl Alarm {
    /// Short id used in listings and on the command line.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// True if `prefix` matches the full id or its leading characters.
    #[must_use]
    pub fn matches_id(&self, prefix: &str) -> bool {
        let prefix = prefix.trim().to_ascii_lowercase();
        !prefix.is_empty()
            && (self.id.to_string().starts_with(&prefix)
                || self.id.simple().to_string().starts_with(&prefix))
    }
}

/// Optional overrides applied when creating an alarm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmOptions {
    pub sound: Option<String>,
    pub volume: Option<f32>,
    pub is_active: Option<bool>,
    pub is_recurring: bool,
    pub recurring_days: Vec<u8>,
}

/// Partial update applied by `edit_alarm`. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlarmPatch {
    pub time: Option<NaiveDateTime>,
    pub is_active: Option<bool>,
    pub sound: Option<String>,
    pub volume: Option<f32>,
    pub label: Option<String>,
    pub is_recurring: Option<bool>,
    pub recurring_days: Option<Vec<u8>>,
}

/// State transitions published by the trigger engine.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmEvent {
    /// An alarm matched the current minute and started ringing.
    Ringing {
        id: Uuid,
        sound: String,
        volume: f32,
        label: String,
        time: NaiveDateTime,
    },
    /// A ringing alarm stopped ringing (stopped, toggled, edited or removed).
    Silenced { id: Uuid },
    /// An alarm was snoozed until `until`.
    Snoozed { id: Uuid, until: NaiveDateTime },
}

impl AlarmEvent {
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Ringing { id, .. } | Self::Silenced { id } | Self::Snoozed { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Ringing { .. })
    }
}

fn default_snooze_minutes() -> u32 {
    DEFAULT_SNOOZE_MINUTES
}

fn default_sound() -> String {
    DEFAULT_SOUND.to_string()
}

fn default_volume() -> f32 {
    DEFAULT_VOLUME
}

fn default_true() -> bool {
    true
}

/// User-tunable alarm behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmSettings {
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u32,

    /// Sound for new alarms.
    #[serde(default = "default_sound")]
    pub default_sound: String,

    /// Volume for new alarms.
    #[serde(default = "default_volume")]
    pub default_volume: f32,

    #[serde(default = "default_true")]
    pub enable_notifications: bool,

    #[serde(default = "default_true")]
    pub enable_wake_lock: bool,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            snooze_minutes: default_snooze_minutes(),
            default_sound: default_sound(),
            default_volume: default_volume(),
            enable_notifications: true,
            enable_wake_lock: true,
        }
    }
}

impl AlarmSettings {
    /// Sets the snooze length, clamped to 1..=60 minutes.
    pub fn set_snooze_minutes(&mut self, minutes: u32) {
        self.snooze_minutes = minutes.clamp(MIN_SNOOZE_MINUTES, MAX_SNOOZE_MINUTES);
    }

    /// Brings loaded values back into range.
    ///
    /// Unknown default sounds fall back to the catalog default.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.set_snooze_minutes(self.snooze_minutes);
        self.default_volume = clamp_volume(self.default_volume);
        if !is_known_sound(&self.default_sound) {
            self.default_sound = default_sound();
        }
        self
    }
}

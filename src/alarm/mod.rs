//! Alarm collection and minute-granularity triggering.
//!
//! [`AlarmTriggerEngine`] owns every alarm, keeps them sorted by time and
//! decides on each scheduler tick which ones start ringing:
//!
//! ```text
//!            evaluate (same minute)          stop / toggle / edit
//!   idle ─────────────────────────▶ ringing ─────────────────────▶ idle
//!                                      │
//!                                      │ snooze (time = now + N min)
//!                                      ▼
//!                                 idle, later time
//! ```
//!
//! Transitions are published as [`AlarmEvent`]s so audio and notifications
//! can follow without the engine knowing about them.

mod engine;
mod error;
mod time;
mod types;

pub use engine::AlarmTriggerEngine;
pub use error::AlarmError;
pub use time::{
    format_alarm_time, next_occurrence, parse_hm, same_minute, snooze_time, time_until,
    truncate_to_minute,
};
pub use types::{
    clamp_volume, Alarm, AlarmEvent, AlarmOptions, AlarmPatch, AlarmSettings, COPY_SUFFIX,
    DEFAULT_SNOOZE_MINUTES, DEFAULT_VOLUME, MAX_SNOOZE_MINUTES, MIN_SNOOZE_MINUTES, PRESET_TIMES,
};

//! Alarm Clock Library
//!
//! This library provides the core functionality for the alarm clock CLI.
//! It includes:
//! - A drift-corrected precision scheduler with a background tick worker
//! - Synthesized alarm sounds with strict voice lifecycle and wake-lock
//! - The alarm trigger engine owning the sorted alarm collection
//! - A notification bridge for ringing alarms
//! - The alarm service composing the above, plus persistence and config
//! - CLI command parsing and display utilities

pub mod alarm;
pub mod audio;
pub mod cli;
pub mod clock;
pub mod config;
pub mod notification;
pub mod scheduler;
pub mod service;
pub mod store;

// Re-export commonly used types for convenience
pub use alarm::{
    Alarm, AlarmError, AlarmEvent, AlarmOptions, AlarmPatch, AlarmSettings, AlarmTriggerEngine,
};
pub use audio::{AudioConfig, AudioEngine, AudioError, SoundDefinition};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use notification::{MockNotifier, NotificationBridge, NotificationError, Notifier};
pub use scheduler::{PrecisionScheduler, SchedulerConfig, SchedulerError, SchedulerStats};
pub use service::AlarmService;
pub use store::{AlarmStore, StoreError, StoredState};

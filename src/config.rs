//! Application configuration.
//!
//! [`AppConfig`] gathers the tuning of every component. All fields have
//! defaults, so an empty JSON object is a valid configuration file:
//!
//! ```json
//! {
//!   "scheduler": { "targetIntervalMs": 1000, "useWorker": true },
//!   "audio": { "volume": 0.7, "wakeLock": true },
//!   "alarms": { "snoozeMinutes": 10, "defaultSound": "clock" }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alarm::AlarmSettings;
use crate::audio::AudioConfig;
use crate::scheduler::{SchedulerConfig, SchedulerError};

/// Interval of the alarm-check subscription.
pub const ALARM_CHECK_INTERVAL_MS: u64 = 1000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("invalid audio config: {0}")]
    Audio(String),
}

impl ConfigError {
    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Read { .. } => "check that the config file exists and is readable",
            Self::Parse { .. } => "the config file must be a JSON object with camelCase keys",
            Self::Scheduler(_) => {
                "targetIntervalMs must be 1-60000 and larger than the drift settings"
            }
            Self::Audio(_) => "volume must be between 0.0 and 1.0",
        }
    }
}

/// Configuration for the whole alarm service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub audio: AudioConfig,
    /// Settings used when the state file has none.
    pub alarms: AlarmSettings,
}

impl AppConfig {
    /// Reads a JSON configuration file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every component's settings.
    ///
    /// Alarm settings are not rejected; they are normalized on use.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;

        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(ConfigError::Audio(format!(
                "volume {} is out of range",
                self.audio.volume
            )));
        }
        if self.audio.sweep_interval_ms == 0 {
            return Err(ConfigError::Audio(
                "sweepIntervalMs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Audio settings with the wake-lock gated by the alarm settings.
    #[must_use]
    pub fn effective_audio(&self, settings: &AlarmSettings) -> AudioConfig {
        AudioConfig {
            wake_lock: self.audio.wake_lock && settings.enable_wake_lock,
            ..self.audio
        }
    }
}

//! Audio engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_volume() -> f32 {
    0.7
}

fn default_wake_lock() -> bool {
    true
}

fn default_sweep_interval_ms() -> u64 {
    5_000
}

fn default_max_session_age_ms() -> u64 {
    30_000
}

fn default_cleanup_grace_ms() -> u64 {
    1_000
}

/// Tuning for the synthesized audio engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    /// Initial master volume, 0.0 to 1.0.
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Hold a wake-lock while sounding.
    #[serde(default = "default_wake_lock")]
    pub wake_lock: bool,

    /// How often stale sessions are swept.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Age after which the sweep reclaims a session.
    #[serde(default = "default_max_session_age_ms")]
    pub max_session_age_ms: u64,

    /// Extra time past a pass's duration before its session is cleaned up.
    #[serde(default = "default_cleanup_grace_ms")]
    pub cleanup_grace_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            wake_lock: default_wake_lock(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_session_age_ms: default_max_session_age_ms(),
            cleanup_grace_ms: default_cleanup_grace_ms(),
        }
    }
}

impl AudioConfig {
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    #[must_use]
    pub fn max_session_age(&self) -> Duration {
        Duration::from_millis(self.max_session_age_ms)
    }

    #[must_use]
    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }
}

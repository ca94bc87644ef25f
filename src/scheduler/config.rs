//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use super::error::SchedulerError;

fn default_target_interval_ms() -> u64 {
    1000
}

fn default_max_drift_ms() -> u64 {
    5
}

fn default_correction_threshold_ms() -> u64 {
    10
}

fn default_use_worker() -> bool {
    true
}

/// Tuning for the precision scheduler.
///
/// # Example
///
/// ```
/// use alarm_clock::scheduler::SchedulerConfig;
///
/// let config = SchedulerConfig::default();
/// assert_eq!(config.target_interval_ms, 1000);
/// assert_eq!(config.max_drift_ms, 5);
/// assert!(config.use_worker);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Nominal spacing between ticks.
    #[serde(default = "default_target_interval_ms")]
    pub target_interval_ms: u64,

    /// Tolerance subtracted from a subscription's interval when deciding
    /// whether it is due.
    #[serde(default = "default_max_drift_ms")]
    pub max_drift_ms: u64,

    /// Drift beyond which the tick baseline is re-established.
    #[serde(default = "default_correction_threshold_ms")]
    pub correction_threshold_ms: u64,

    /// Whether to run interval timing on a background worker thread.
    #[serde(default = "default_use_worker")]
    pub use_worker: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_interval_ms: default_target_interval_ms(),
            max_drift_ms: default_max_drift_ms(),
            correction_threshold_ms: default_correction_threshold_ms(),
            use_worker: default_use_worker(),
        }
    }
}

impl SchedulerConfig {
    /// Returns a configuration that never spawns the worker thread.
    #[must_use]
    pub fn foreground() -> Self {
        Self {
            use_worker: false,
            ..Self::default()
        }
    }

    /// Sets the nominal tick interval.
    #[must_use]
    pub fn with_target_interval_ms(mut self, interval_ms: u64) -> Self {
        self.target_interval_ms = interval_ms;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the interval is zero or
    /// longer than a minute, or the tolerances exceed the interval.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.target_interval_ms == 0 || self.target_interval_ms > 60_000 {
            return Err(SchedulerError::InvalidConfig(
                "target interval must be between 1 and 60000 ms".to_string(),
            ));
        }
        if self.max_drift_ms >= self.target_interval_ms {
            return Err(SchedulerError::InvalidConfig(
                "max drift must be smaller than the target interval".to_string(),
            ));
        }
        if self.correction_threshold_ms >= self.target_interval_ms {
            return Err(SchedulerError::InvalidConfig(
                "correction threshold must be smaller than the target interval".to_string(),
            ));
        }
        Ok(())
    }
}

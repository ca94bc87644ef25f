//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur while driving the precision scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// `start` was called outside of a tokio runtime.
    #[error("no async runtime available to drive the scheduler")]
    NoRuntime,

    /// The background tick worker could not be spawned.
    #[error("failed to spawn tick worker: {0}")]
    WorkerSpawn(String),

    /// The scheduler was disposed and cannot be restarted.
    #[error("scheduler has been disposed")]
    Disposed,

    /// The configuration is out of range.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// Returns true if the scheduler keeps working in a degraded mode.
    ///
    /// A worker that fails to spawn is replaced by the foreground loop.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::WorkerSpawn(_))
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NoRuntime => "call start() from within a tokio runtime",
            Self::WorkerSpawn(_) => "ticks continue on the foreground loop",
            Self::Disposed => "create a new scheduler instance",
            Self::InvalidConfig(_) => "check the scheduler section of the configuration",
        }
    }
}

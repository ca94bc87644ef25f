//! Alarm engine error types.

use thiserror::Error;

/// Errors raised when creating or editing alarms.
///
/// Operations on unknown alarm ids are not errors; they are ignored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// The sound id is not in the catalog.
    #[error("unknown sound: {0}")]
    UnknownSound(String),

    /// Hour or minute out of range.
    #[error("invalid time {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    /// A time string could not be parsed.
    #[error("could not parse time '{0}' (expected HH:MM)")]
    ParseTime(String),
}

impl AlarmError {
    /// Returns true if the error was caused by user input.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidTime { .. } | Self::ParseTime(_))
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::UnknownSound(_) => "run `alarm-clock sounds` to list available sounds",
            Self::InvalidTime { .. } => "hours range from 0 to 23 and minutes from 0 to 59",
            Self::ParseTime(_) => "use 24-hour HH:MM, for example 07:30",
        }
    }
}

//! Audio engine error types.

use thiserror::Error;

/// Errors that can occur while synthesizing or playing alarm sounds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// No audio output could be opened or resumed.
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    /// The requested sound id is not in the catalog.
    #[error("unknown sound: {0}")]
    UnknownSound(String),

    /// A voice could not be started or stopped on the output.
    #[error("audio backend error: {0}")]
    Backend(String),

    /// The voice was already stopped or finished.
    #[error("voice already stopped")]
    AlreadyStopped,

    /// The engine was disposed.
    #[error("audio engine has been disposed")]
    Disposed,
}

impl AudioError {
    /// Returns true if this error is related to the output device.
    #[must_use]
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Backend(_))
    }

    /// Returns true if the error can safely be ignored during cleanup.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyStopped)
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "check that an audio output device is connected",
            Self::UnknownSound(_) => "run `alarm-clock sounds` to list available sounds",
            Self::Backend(_) => "check the system audio settings",
            Self::AlreadyStopped => "no action needed",
            Self::Disposed => "create a new audio engine",
        }
    }
}

/// Errors from acquiring a wake-lock.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WakeLockError {
    /// No wake-lock mechanism exists on this platform.
    #[error("wake-lock is not supported on this platform")]
    Unsupported,

    /// The inhibitor process could not be started.
    #[error("failed to acquire wake-lock: {0}")]
    AcquireFailed(String),
}

impl WakeLockError {
    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Unsupported => "disable the wake-lock in the audio configuration",
            Self::AcquireFailed(_) => "make sure caffeinate or systemd-inhibit is installed",
        }
    }
}

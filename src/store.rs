//! Persisted alarm state.
//!
//! The state file is a single JSON document:
//!
//! ```json
//! { "alarms": [ ... ], "settings": { ... } }
//! ```
//!
//! Ringing is runtime state and is always written as `false`. The default
//! location is `<data_dir>/alarm-clock/state.json`; `ALARM_CLOCK_STORE`
//! overrides it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::alarm::{Alarm, AlarmSettings};

/// Environment variable overriding the state file location.
pub const STORE_ENV: &str = "ALARM_CLOCK_STORE";

const APP_DIR: &str = "alarm-clock";
const STATE_FILE: &str = "state.json";

/// State file errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No data directory could be determined.
    #[error("Failed to locate a data directory")]
    DataDirNotFound,

    /// Failed to create the directory holding the state file.
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The state file is not valid JSON for this version.
    #[error("Corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StoreError {
    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::DataDirNotFound => "pass --store PATH or set ALARM_CLOCK_STORE",
            Self::DirectoryCreation { .. } | Self::Write { .. } => {
                "check that the state directory is writable"
            }
            Self::Read { .. } => "check that the state file is readable",
            Self::Corrupt { .. } => "fix or remove the state file to start over",
            Self::Serialize(_) => "this is a bug; please report it",
        }
    }
}

/// Everything persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredState {
    pub alarms: Vec<Alarm>,
    pub settings: AlarmSettings,
}

impl StoredState {
    #[must_use]
    pub fn new(alarms: Vec<Alarm>, settings: AlarmSettings) -> Self {
        Self { alarms, settings }
    }
}

/// JSON file holding a [`StoredState`].
#[derive(Debug, Clone)]
pub struct AlarmStore {
    path: PathBuf,
}

impl AlarmStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Opens the store at `path`, or at the default location.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DataDirNotFound` if no path is given and no
    /// default can be determined.
    pub fn open(path: Option<PathBuf>) -> Result<Self, StoreError> {
        match path {
            Some(path) => Ok(Self::new(path)),
            None => Self::default_path().map(Self::new),
        }
    }

    /// `ALARM_CLOCK_STORE` if set, else `<data_dir>/alarm-clock/state.json`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DataDirNotFound` if neither is available.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        if let Some(path) = std::env::var_os(STORE_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join(STATE_FILE))
            .ok_or(StoreError::DataDirNotFound)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state file. A missing file is an empty state.
    ///
    /// Loaded settings are normalized and ringing flags cleared.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Read` or `StoreError::Corrupt`.
    pub fn load(&self) -> Result<StoredState, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file, starting empty");
                return Ok(StoredState::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut state: StoredState =
            serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        state.settings = state.settings.normalized();
        for alarm in &mut state.alarms {
            alarm.is_ringing = false;
        }
        debug!(
            path = %self.path.display(),
            "Loaded {} alarm(s)",
            state.alarms.len()
        );
        Ok(state)
    }

    /// Writes the state file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, state: &StoredState) -> Result<(), StoreError> {
        let mut state = state.clone();
        for alarm in &mut state.alarms {
            alarm.is_ringing = false;
        }
        let json = serde_json::to_string_pretty(&state).map_err(StoreError::Serialize)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::DirectoryCreation {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!(path = %self.path.display(), "Saved {} alarm(s)", state.alarms.len());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

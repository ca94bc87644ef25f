//! Command definitions for the alarm clock CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::alarm::{parse_hm, PRESET_TIMES};
use crate::audio::is_known_sound;

/// Maximum label length accepted on the command line.
const MAX_LABEL_LENGTH: usize = 100;

// ============================================================================
// CLI Structure
// ============================================================================

/// Alarm clock with a drift-corrected scheduler and synthesized sounds
#[derive(Parser, Debug)]
#[command(
    name = "alarm-clock",
    version,
    about = "Precision alarm clock with synthesized alarm sounds",
    long_about = "Manage alarms from the terminal and run the alarm service in the foreground.\n\
                  Alarms are checked every second and ring for the whole matching minute.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path of the alarm state file
    #[arg(long, global = true, env = "ALARM_CLOCK_STORE")]
    pub store: Option<PathBuf>,

    /// Path of a JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the alarm service in the foreground
    Run,

    /// Add an alarm at the next HH:MM
    Add(AddArgs),

    /// Add an alarm a number of minutes from now
    Quick {
        /// Minutes from now (1-1440)
        #[arg(value_parser = clap::value_parser!(u32).range(1..=1440))]
        minutes: u32,
    },

    /// Add an alarm at a preset wake-up time, or list the presets
    Preset {
        /// One of the preset times, e.g. 06:30
        #[arg(value_parser = parse_preset)]
        time: Option<(u32, u32)>,

        /// Label for the alarm
        #[arg(short, long, value_parser = validate_label)]
        label: Option<String>,
    },

    /// List alarms
    List {
        /// Print alarms as JSON
        #[arg(long)]
        json: bool,
    },

    /// Edit an alarm
    Edit(EditArgs),

    /// Remove an alarm
    Remove {
        /// Alarm id or unique id prefix
        id: String,
    },

    /// Enable or disable an alarm
    Toggle {
        /// Alarm id or unique id prefix
        id: String,
    },

    /// Copy an alarm to the same time one day later
    Duplicate {
        /// Alarm id or unique id prefix
        id: String,
    },

    /// Remove past, non-recurring alarms
    ClearExpired,

    /// Show or change alarm settings
    Settings(SettingsArgs),

    /// List available alarm sounds
    Sounds,

    /// Play a sound preview
    TestSound {
        /// Sound id (see `sounds`)
        #[arg(value_parser = validate_sound)]
        sound: String,

        /// Preview length in seconds (1-30)
        #[arg(
            short,
            long,
            default_value = "3",
            value_parser = clap::value_parser!(u64).range(1..=30)
        )]
        duration: u64,

        /// Playback volume (0.0-1.0)
        #[arg(long, value_parser = parse_volume)]
        volume: Option<f32>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Command Arguments
// ============================================================================

/// Arguments for the add command
#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Alarm time in 24-hour HH:MM
    #[arg(value_parser = parse_time)]
    pub time: (u32, u32),

    /// Label for the alarm
    #[arg(value_parser = validate_label)]
    pub label: Option<String>,

    /// Alarm sound (see `sounds`)
    #[arg(short, long, value_parser = validate_sound)]
    pub sound: Option<String>,

    /// Alarm volume (0.0-1.0)
    #[arg(long, value_parser = parse_volume)]
    pub volume: Option<f32>,

    /// Create the alarm disabled
    #[arg(long)]
    pub inactive: bool,
}

/// Arguments for the edit command
#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Alarm id or unique id prefix
    pub id: String,

    /// New time in 24-hour HH:MM (next occurrence)
    #[arg(short, long, value_parser = parse_time)]
    pub time: Option<(u32, u32)>,

    /// New label
    #[arg(short, long, value_parser = validate_label)]
    pub label: Option<String>,

    /// New sound
    #[arg(short, long, value_parser = validate_sound)]
    pub sound: Option<String>,

    /// New volume (0.0-1.0)
    #[arg(long, value_parser = parse_volume)]
    pub volume: Option<f32>,
}

impl EditArgs {
    /// True if no change was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.label.is_none() && self.sound.is_none() && self.volume.is_none()
    }
}

/// Arguments for the settings command
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Snooze length in minutes (1-60)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=60))]
    pub snooze: Option<u32>,

    /// Default sound for new alarms
    #[arg(long, value_parser = validate_sound)]
    pub sound: Option<String>,

    /// Default volume for new alarms (0.0-1.0)
    #[arg(long, value_parser = parse_volume)]
    pub volume: Option<f32>,

    /// Show notifications when alarms ring
    #[arg(long)]
    pub notifications: Option<bool>,

    /// Keep the display awake while an alarm rings
    #[arg(long)]
    pub wake_lock: Option<bool>,
}

impl SettingsArgs {
    /// True if no change was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snooze.is_none()
            && self.sound.is_none()
            && self.volume.is_none()
            && self.notifications.is_none()
            && self.wake_lock.is_none()
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

fn parse_time(s: &str) -> Result<(u32, u32), String> {
    parse_hm(s).map_err(|e| e.to_string())
}

fn parse_preset(s: &str) -> Result<(u32, u32), String> {
    let time = parse_time(s)?;
    if PRESET_TIMES.contains(&time) {
        Ok(time)
    } else {
        Err(format!(
            "'{}' is not a preset time (run `alarm-clock preset` to list them)",
            s
        ))
    }
}

/// Validates an alarm label.
///
/// - Must not be empty
/// - Must not exceed 100 characters
fn validate_label(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        return Err("label cannot be empty".to_string());
    }
    if s.chars().count() > MAX_LABEL_LENGTH {
        return Err(format!(
            "label must be at most {} characters",
            MAX_LABEL_LENGTH
        ));
    }
    Ok(s.to_string())
}

fn validate_sound(s: &str) -> Result<String, String> {
    if is_known_sound(s) {
        Ok(s.to_string())
    } else {
        Err(format!("unknown sound '{}' (run `alarm-clock sounds`)", s))
    }
}

fn parse_volume(s: &str) -> Result<f32, String> {
    let volume: f32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if (0.0..=1.0).contains(&volume) {
        Ok(volume)
    } else {
        Err("volume must be between 0.0 and 1.0".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

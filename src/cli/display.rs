//! Display utilities for the alarm clock CLI.
//!
//! This module provides formatted output for:
//! - Alarm listings
//! - Success messages
//! - Error messages with suggestions
//! - The foreground service

use chrono::NaiveDateTime;

use crate::alarm::{format_alarm_time, time_until, Alarm, AlarmError, AlarmSettings, PRESET_TIMES};
use crate::audio::{sound_name, AudioError, SoundDefinition};
use crate::config::ConfigError;
use crate::scheduler::SchedulerError;
use crate::store::StoreError;

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows a newly created alarm.
    pub fn show_added(alarm: &Alarm, now: NaiveDateTime) {
        println!("* Alarm set for {}", Self::format_when(alarm, now));
        println!("  id: {}", alarm.short_id());
        if !alarm.label.is_empty() {
            println!("  label: {}", alarm.label);
        }
        println!("  sound: {}", sound_name(&alarm.sound));
    }

    /// Shows the alarm table.
    pub fn show_alarm_list(alarms: &[Alarm], now: NaiveDateTime) {
        if alarms.is_empty() {
            println!("No alarms set");
            return;
        }
        for alarm in alarms {
            println!("{}", Self::format_alarm_line(alarm, now));
        }
    }

    pub fn show_removed(alarm: &Alarm) {
        println!("[] Removed alarm {}", alarm.short_id());
    }

    pub fn show_toggled(alarm: &Alarm) {
        let state = if alarm.is_active { "enabled" } else { "disabled" };
        println!("* Alarm {} {}", alarm.short_id(), state);
    }

    pub fn show_edited(alarm: &Alarm, now: NaiveDateTime) {
        println!("* Updated alarm {}", alarm.short_id());
        println!("  {}", Self::format_alarm_line(alarm, now));
    }

    pub fn show_cleared(count: usize) {
        match count {
            0 => println!("No expired alarms"),
            1 => println!("[] Removed 1 expired alarm"),
            n => println!("[] Removed {} expired alarms", n),
        }
    }

    /// Lists the preset wake-up times.
    pub fn show_presets() {
        println!("Preset times:");
        for (hour, minute) in PRESET_TIMES {
            println!("  {:02}:{:02}", hour, minute);
        }
    }

    /// Lists the sound catalog.
    pub fn show_sounds(sounds: &[SoundDefinition], default_sound: &str) {
        println!("Available sounds");
        println!("─────────────────────────────");
        for sound in sounds {
            let marker = if sound.key == default_sound { " (default)" } else { "" };
            println!("  {:<12} {}{}", sound.key, sound.name, marker);
        }
    }

    pub fn show_settings(settings: &AlarmSettings) {
        println!("Alarm settings");
        println!("─────────────────────────────");
        println!("Snooze:        {} min", settings.snooze_minutes);
        println!("Default sound: {}", sound_name(&settings.default_sound));
        println!("Default volume: {:.0}%", settings.default_volume * 100.0);
        println!("Notifications: {}", Self::on_off(settings.enable_notifications));
        println!("Wake-lock:     {}", Self::on_off(settings.enable_wake_lock));
    }

    pub fn show_previewing(sound: &SoundDefinition, seconds: u64) {
        println!("> Playing {} for {}s", sound.name, seconds);
    }

    /// Shows the banner of the foreground service.
    pub fn show_running(next: Option<&Alarm>, count: usize, now: NaiveDateTime) {
        println!("> Alarm service running ({} alarm(s))", count);
        match next {
            Some(alarm) => println!("  next: {}", Self::format_when(alarm, now)),
            None => println!("  no upcoming alarms"),
        }
        println!("  commands: s = snooze, x = stop, q = quit");
    }

    pub fn show_snoozed(count: usize, minutes: u32) {
        if count == 0 {
            println!("Nothing is ringing");
        } else {
            println!("z Snoozed {} alarm(s) for {} min", count, minutes);
        }
    }

    pub fn show_stopped(count: usize) {
        if count == 0 {
            println!("Nothing is ringing");
        } else {
            println!("[] Stopped {} alarm(s)", count);
        }
    }

    pub fn show_run_help() {
        println!("commands: s = snooze, x = stop, q = quit");
    }

    /// Shows an error message, with a suggestion when one is known.
    pub fn show_error(error: &anyhow::Error) {
        eprintln!("Error: {:#}", error);
        if let Some(suggestion) = Self::suggestion_for(error) {
            eprintln!("  hint: {}", suggestion);
        }
    }

    /// Finds a suggestion from the first typed error in the chain.
    #[must_use]
    pub fn suggestion_for(error: &anyhow::Error) -> Option<&'static str> {
        error.chain().find_map(|cause| {
            if let Some(e) = cause.downcast_ref::<AlarmError>() {
                Some(e.suggestion())
            } else if let Some(e) = cause.downcast_ref::<StoreError>() {
                Some(e.suggestion())
            } else if let Some(e) = cause.downcast_ref::<ConfigError>() {
                Some(e.suggestion())
            } else if let Some(e) = cause.downcast_ref::<AudioError>() {
                Some(e.suggestion())
            } else {
                cause
                    .downcast_ref::<SchedulerError>()
                    .map(SchedulerError::suggestion)
            }
        })
    }

    /// One listing line: status, id, time, countdown, label and sound.
    #[must_use]
    pub fn format_alarm_line(alarm: &Alarm, now: NaiveDateTime) -> String {
        let status = if alarm.is_ringing {
            "!!"
        } else if alarm.is_active {
            "on"
        } else {
            "--"
        };
        let label = if alarm.label.is_empty() {
            String::new()
        } else {
            format!("  {}", alarm.label)
        };
        format!(
            "[{}] {}  {}{}  ({}, {:.0}%)",
            status,
            alarm.short_id(),
            Self::format_when(alarm, now),
            label,
            sound_name(&alarm.sound),
            alarm.volume * 100.0
        )
    }

    /// "Today 07:30 (in 2h 5m)".
    #[must_use]
    pub fn format_when(alarm: &Alarm, now: NaiveDateTime) -> String {
        format!(
            "{} ({})",
            format_alarm_time(alarm.time, now),
            time_until(alarm.time, now)
        )
    }

    fn on_off(value: bool) -> &'static str {
        if value {
            "on"
        } else {
            "off"
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! The alarm trigger engine.
//!
//! Owns the alarm collection, kept sorted by time, and publishes an
//! [`AlarmEvent`] for every ringing transition.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::AlarmError;
use super::time::{next_occurrence, same_minute, snooze_time};
use super::types::{
    clamp_volume, Alarm, AlarmEvent, AlarmOptions, AlarmPatch, AlarmSettings, COPY_SUFFIX,
};
use crate::audio::is_known_sound;
use crate::clock::Clock;

/// Minute-granularity alarm matcher and alarm collection owner.
pub struct AlarmTriggerEngine {
    alarms: Vec<Alarm>,
    settings: AlarmSettings,
    clock: Arc<dyn Clock>,
    events: Option<UnboundedSender<AlarmEvent>>,
}

impl AlarmTriggerEngine {
    #[must_use]
    pub fn new(settings: AlarmSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            alarms: Vec::new(),
            settings: settings.normalized(),
            clock,
            events: None,
        }
    }

    /// Publishes transitions on `events`.
    #[must_use]
    pub fn with_events(mut self, events: UnboundedSender<AlarmEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Replaces the collection with previously persisted alarms.
    ///
    /// Ringing flags are cleared, volumes clamped and expired alarms
    /// dropped. No events are published.
    pub fn restore(&mut self, alarms: Vec<Alarm>) {
        self.alarms = alarms
            .into_iter()
            .map(|mut alarm| {
                alarm.is_ringing = false;
                alarm.volume = clamp_volume(alarm.volume);
                alarm
            })
            .collect();
        self.sort();
        let removed = self.clear_expired();
        debug!(
            "Restored {} alarm(s), {} expired",
            self.alarms.len(),
            removed
        );
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    /// Starts ringing every active, idle alarm set for the current minute.
    ///
    /// Returns the ids that started ringing.
    pub fn evaluate(&mut self) -> Vec<Uuid> {
        let now = self.clock.now();
        let mut events = Vec::new();

        for alarm in self
            .alarms
            .iter_mut()
            .filter(|a| a.is_active && !a.is_ringing)
        {
            if same_minute(alarm.time, now) {
                alarm.is_ringing = true;
                alarm.last_triggered = Some(now);
                info!(alarm = %alarm.id, "Alarm ringing");
                events.push(AlarmEvent::Ringing {
                    id: alarm.id,
                    sound: alarm.sound.clone(),
                    volume: alarm.volume,
                    label: alarm.label.clone(),
                    time: alarm.time,
                });
            }
        }

        let triggered = events.iter().map(AlarmEvent::id).collect();
        for event in events {
            self.emit(event);
        }
        triggered
    }

    // ------------------------------------------------------------------------
    // Ringing control
    // ------------------------------------------------------------------------

    /// Moves the alarm to now plus the snooze length and silences it.
    ///
    /// Returns the new time, or `None` for an unknown id.
    pub fn snooze(&mut self, id: Uuid) -> Option<NaiveDateTime> {
        let until = snooze_time(self.clock.now(), self.settings.snooze_minutes);
        let alarm = self.find_mut(id)?;

        let was_ringing = alarm.is_ringing;
        alarm.time = until;
        alarm.is_ringing = false;
        alarm.snooze_count += 1;
        self.sort();

        if was_ringing {
            self.emit(AlarmEvent::Silenced { id });
        }
        self.emit(AlarmEvent::Snoozed { id, until });
        debug!(alarm = %id, "Alarm snoozed until {}", until);
        Some(until)
    }

    /// Silences every ringing alarm. Returns how many were ringing.
    pub fn stop_all(&mut self) -> usize {
        let silenced: Vec<Uuid> = self
            .alarms
            .iter_mut()
            .filter(|a| a.is_ringing)
            .map(|a| {
                a.is_ringing = false;
                a.id
            })
            .collect();

        for id in &silenced {
            self.emit(AlarmEvent::Silenced { id: *id });
        }
        silenced.len()
    }

    /// Sets the ringing flag. Only active alarms can start ringing.
    ///
    /// Returns false for an unknown id or a refused transition.
    pub fn set_alarm_ringing(&mut self, id: Uuid, ringing: bool) -> bool {
        let now = self.clock.now();
        let Some(alarm) = self.find_mut(id) else {
            return false;
        };

        if ringing && !alarm.is_active {
            debug!(alarm = %id, "Refusing to ring an inactive alarm");
            return false;
        }
        if alarm.is_ringing == ringing {
            return true;
        }

        alarm.is_ringing = ringing;
        let event = if ringing {
            alarm.last_triggered = Some(now);
            AlarmEvent::Ringing {
                id,
                sound: alarm.sound.clone(),
                volume: alarm.volume,
                label: alarm.label.clone(),
                time: alarm.time,
            }
        } else {
            AlarmEvent::Silenced { id }
        };
        self.emit(event);
        true
    }

    // ------------------------------------------------------------------------
    // Collection management
    // ------------------------------------------------------------------------

    /// Adds an alarm at `time`.
    ///
    /// Sound and volume default to the settings unless overridden.
    ///
    /// # Errors
    ///
    /// Returns `AlarmError::UnknownSound` if the chosen sound is not in the
    /// catalog.
    pub fn add_alarm(
        &mut self,
        time: NaiveDateTime,
        label: impl Into<String>,
        options: AlarmOptions,
    ) -> Result<Uuid, AlarmError> {
        let sound = options
            .sound
            .unwrap_or_else(|| self.settings.default_sound.clone());
        if !is_known_sound(&sound) {
            return Err(AlarmError::UnknownSound(sound));
        }

        let alarm = Alarm {
            id: Uuid::new_v4(),
            time,
            is_active: options.is_active.unwrap_or(true),
            sound,
            volume: clamp_volume(options.volume.unwrap_or(self.settings.default_volume)),
            label: label.into(),
            is_ringing: false,
            created_at: self.clock.now(),
            last_triggered: None,
            snooze_count: 0,
            is_recurring: options.is_recurring,
            recurring_days: options.recurring_days,
        };
        let id = alarm.id;

        self.alarms.push(alarm);
        self.sort();
        debug!(alarm = %id, "Alarm added for {}", time);
        Ok(id)
    }

    /// Adds an alarm `minutes` from now, labelled "in N min".
    ///
    /// # Errors
    ///
    /// Propagates errors from [`add_alarm`](Self::add_alarm).
    pub fn add_quick_alarm(&mut self, minutes: u32) -> Result<Uuid, AlarmError> {
        let time = self.clock.now() + Duration::minutes(i64::from(minutes));
        self.add_alarm(time, format!("in {} min", minutes), AlarmOptions::default())
    }

    /// Adds an alarm at the next `hour:minute`, rolling to tomorrow if that
    /// time has passed today.
    ///
    /// # Errors
    ///
    /// Returns `AlarmError::InvalidTime` for an out-of-range time.
    pub fn add_preset_alarm(
        &mut self,
        hour: u32,
        minute: u32,
        label: impl Into<String>,
    ) -> Result<Uuid, AlarmError> {
        self.add_alarm_at(hour, minute, label, AlarmOptions::default())
    }

    /// Like [`add_preset_alarm`](Self::add_preset_alarm) with options.
    ///
    /// # Errors
    ///
    /// Returns `AlarmError::InvalidTime` or `AlarmError::UnknownSound`.
    pub fn add_alarm_at(
        &mut self,
        hour: u32,
        minute: u32,
        label: impl Into<String>,
        options: AlarmOptions,
    ) -> Result<Uuid, AlarmError> {
        let time = next_occurrence(self.clock.now(), hour, minute)?;
        self.add_alarm(time, label, options)
    }

    /// Removes an alarm. Returns false for an unknown id.
    pub fn remove_alarm(&mut self, id: Uuid) -> bool {
        let Some(index) = self.alarms.iter().position(|a| a.id == id) else {
            return false;
        };
        let alarm = self.alarms.remove(index);
        if alarm.is_ringing {
            self.emit(AlarmEvent::Silenced { id });
        }
        debug!(alarm = %id, "Alarm removed");
        true
    }

    /// Flips the active flag and always clears ringing.
    ///
    /// Returns the new active state, or `None` for an unknown id.
    pub fn toggle_alarm(&mut self, id: Uuid) -> Option<bool> {
        let alarm = self.find_mut(id)?;
        let was_ringing = alarm.is_ringing;
        alarm.is_active = !alarm.is_active;
        alarm.is_ringing = false;
        let active = alarm.is_active;

        if was_ringing {
            self.emit(AlarmEvent::Silenced { id });
        }
        Some(active)
    }

    /// Applies `patch` to an alarm and re-sorts.
    ///
    /// Deactivating an alarm silences it. Returns `Ok(false)` for an
    /// unknown id.
    ///
    /// # Errors
    ///
    /// Returns `AlarmError::UnknownSound` if the patch names an unknown sound.
    pub fn edit_alarm(&mut self, id: Uuid, patch: AlarmPatch) -> Result<bool, AlarmError> {
        if let Some(sound) = &patch.sound {
            if !is_known_sound(sound) {
                return Err(AlarmError::UnknownSound(sound.clone()));
            }
        }

        let Some(alarm) = self.find_mut(id) else {
            return Ok(false);
        };
        let was_ringing = alarm.is_ringing;

        if let Some(time) = patch.time {
            alarm.time = time;
        }
        if let Some(active) = patch.is_active {
            alarm.is_active = active;
        }
        if let Some(sound) = patch.sound {
            alarm.sound = sound;
        }
        if let Some(volume) = patch.volume {
            alarm.volume = clamp_volume(volume);
        }
        if let Some(label) = patch.label {
            alarm.label = label;
        }
        if let Some(recurring) = patch.is_recurring {
            alarm.is_recurring = recurring;
        }
        if let Some(days) = patch.recurring_days {
            alarm.recurring_days = days;
        }
        if !alarm.is_active {
            alarm.is_ringing = false;
        }
        let silenced = was_ringing && !alarm.is_ringing;

        self.sort();
        if silenced {
            self.emit(AlarmEvent::Silenced { id });
        }
        Ok(true)
    }

    /// Copies an alarm to the same time one day later.
    ///
    /// Returns the new id, or `None` for an unknown id.
    pub fn duplicate(&mut self, id: Uuid) -> Option<Uuid> {
        let source = self.get(id)?.clone();
        let options = AlarmOptions {
            sound: Some(source.sound),
            volume: Some(source.volume),
            is_active: None,
            is_recurring: source.is_recurring,
            recurring_days: source.recurring_days,
        };
        self.add_alarm(
            source.time + Duration::days(1),
            format!("{}{}", source.label, COPY_SUFFIX),
            options,
        )
        .ok()
    }

    /// Removes alarms that are in the past, not ringing and not recurring.
    ///
    /// Returns how many were removed.
    pub fn clear_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.alarms.len();
        self.alarms
            .retain(|a| a.is_ringing || a.time > now || a.is_recurring);
        before - self.alarms.len()
    }

    /// Adopts state written by another process.
    ///
    /// Alarms that are ringing here keep ringing if they are still present
    /// and active; the rest are silenced. Expired alarms are dropped.
    pub fn reload(&mut self, alarms: Vec<Alarm>, settings: AlarmSettings) {
        let previous = std::mem::take(&mut self.alarms);
        self.alarms = alarms
            .into_iter()
            .map(|mut alarm| {
                let ringing = previous
                    .iter()
                    .find(|p| p.id == alarm.id && p.is_ringing)
                    .filter(|_| alarm.is_active);
                alarm.is_ringing = ringing.is_some();
                if let Some(ringing) = ringing {
                    alarm.last_triggered = ringing.last_triggered;
                }
                alarm.volume = clamp_volume(alarm.volume);
                alarm
            })
            .collect();
        self.settings = settings.normalized();
        self.sort();
        self.clear_expired();

        let silenced: Vec<Uuid> = previous
            .iter()
            .filter(|p| p.is_ringing && !self.get(p.id).is_some_and(|a| a.is_ringing))
            .map(|p| p.id)
            .collect();
        for id in silenced {
            self.emit(AlarmEvent::Silenced { id });
        }
        debug!("Reloaded {} alarm(s)", self.alarms.len());
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// All alarms, sorted by time.
    #[must_use]
    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Alarm> {
        self.alarms.iter().find(|a| a.id == id)
    }

    /// Resolves a full id or unique short-id prefix.
    #[must_use]
    pub fn resolve_id(&self, prefix: &str) -> Option<Uuid> {
        let mut matches = self.alarms.iter().filter(|a| a.matches_id(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.id)
    }

    #[must_use]
    pub fn is_any_ringing(&self) -> bool {
        self.alarms.iter().any(|a| a.is_ringing)
    }

    #[must_use]
    pub fn ringing_alarms(&self) -> Vec<&Alarm> {
        self.alarms.iter().filter(|a| a.is_ringing).collect()
    }

    /// Earliest active, idle alarm still in the future.
    #[must_use]
    pub fn next_alarm(&self) -> Option<&Alarm> {
        let now = self.clock.now();
        self.alarms
            .iter()
            .find(|a| a.is_active && !a.is_ringing && a.time > now)
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn settings(&self) -> &AlarmSettings {
        &self.settings
    }

    /// Sets the snooze length, clamped to 1..=60 minutes.
    pub fn set_snooze_minutes(&mut self, minutes: u32) {
        self.settings.set_snooze_minutes(minutes);
    }

    /// Sets the sound used for new alarms.
    ///
    /// # Errors
    ///
    /// Returns `AlarmError::UnknownSound` if `sound` is not in the catalog.
    pub fn set_default_sound(&mut self, sound: &str) -> Result<(), AlarmError> {
        if !is_known_sound(sound) {
            return Err(AlarmError::UnknownSound(sound.to_string()));
        }
        self.settings.default_sound = sound.to_string();
        Ok(())
    }

    pub fn set_default_volume(&mut self, volume: f32) {
        self.settings.default_volume = clamp_volume(volume);
    }

    pub fn set_notifications_enabled(&mut self, enabled: bool) {
        self.settings.enable_notifications = enabled;
    }

    pub fn set_wake_lock_enabled(&mut self, enabled: bool) {
        self.settings.enable_wake_lock = enabled;
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut Alarm> {
        let found = self.alarms.iter_mut().find(|a| a.id == id);
        if found.is_none() {
            debug!(alarm = %id, "Ignoring unknown alarm id");
        }
        found
    }

    fn sort(&mut self) {
        self.alarms.sort_by_key(|a| a.time);
    }

    fn emit(&self, event: AlarmEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                debug!("Alarm event receiver dropped");
            }
        }
    }
}

impl std::fmt::Debug for AlarmTriggerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmTriggerEngine")
            .field("alarms", &self.alarms.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn engine_at(
        start: NaiveDateTime,
    ) -> (AlarmTriggerEngine, Arc<ManualClock>, UnboundedReceiver<AlarmEvent>) {
        let clock = Arc::new(ManualClock::new(start));
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = AlarmTriggerEngine::new(AlarmSettings::default(), clock.clone()).with_events(tx);
        (engine, clock, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<AlarmEvent>) -> Vec<AlarmEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // ------------------------------------------------------------------------
    // Matching Tests
    // ------------------------------------------------------------------------

    mod matching_tests {
        use super::*;

        #[test]
        fn test_alarm_rings_within_its_minute() {
            let (mut engine, clock, mut rx) = engine_at(at(7, 59, 59));
            let id = engine
                .add_alarm(at(8, 0, 0), "Wake", AlarmOptions::default())
                .unwrap();

            assert!(engine.evaluate().is_empty());

            clock.advance(std::time::Duration::from_secs(31));
            assert_eq!(engine.evaluate(), vec![id]);

            let alarm = engine.get(id).unwrap();
            assert!(alarm.is_ringing);
            assert_eq!(alarm.last_triggered, Some(at(8, 0, 30)));
            assert!(matches!(
                drain(&mut rx).as_slice(),
                [AlarmEvent::Ringing { label, .. }] if label == "Wake"
            ));
        }

        #[test]
        fn test_alarm_does_not_ring_after_its_minute() {
            let (mut engine, clock, _rx) = engine_at(at(7, 0, 0));
            engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();

            clock.set(at(8, 1, 0));
            assert!(engine.evaluate().is_empty());
            assert!(!engine.is_any_ringing());
        }

        #[test]
        fn test_ringing_alarm_is_not_retriggered() {
            let (mut engine, _clock, mut rx) = engine_at(at(8, 0, 0));
            engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();

            assert_eq!(engine.evaluate().len(), 1);
            assert!(engine.evaluate().is_empty());
            assert_eq!(drain(&mut rx).len(), 1);
        }

        #[test]
        fn test_inactive_alarm_never_rings() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            let options = AlarmOptions {
                is_active: Some(false),
                ..AlarmOptions::default()
            };
            engine.add_alarm(at(8, 0, 0), "", options).unwrap();

            assert!(engine.evaluate().is_empty());
        }

        #[test]
        fn test_multiple_alarms_ring_together() {
            let (mut engine, _clock, _rx) = engine_at(at(9, 0, 10));
            let a = engine
                .add_alarm(at(9, 0, 0), "a", AlarmOptions::default())
                .unwrap();
            let b = engine
                .add_alarm(at(9, 0, 0), "b", AlarmOptions::default())
                .unwrap();

            let triggered = engine.evaluate();
            assert_eq!(triggered, vec![a, b]);
            assert_eq!(engine.ringing_alarms().len(), 2);
        }
    }

    // ------------------------------------------------------------------------
    // Ringing Control Tests
    // ------------------------------------------------------------------------

    mod ringing_tests {
        use super::*;

        #[test]
        fn test_snooze_moves_time_and_counts() {
            let (mut engine, clock, mut rx) = engine_at(at(8, 0, 0));
            let id = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            clock.advance(std::time::Duration::from_secs(30));
            engine.evaluate();
            drain(&mut rx);

            let until = engine.snooze(id).unwrap();

            assert_eq!(until, at(8, 10, 30));
            let alarm = engine.get(id).unwrap();
            assert_eq!(alarm.time, at(8, 10, 30));
            assert!(!alarm.is_ringing);
            assert_eq!(alarm.snooze_count, 1);
            assert_eq!(
                drain(&mut rx),
                vec![
                    AlarmEvent::Silenced { id },
                    AlarmEvent::Snoozed { id, until }
                ]
            );
        }

        #[test]
        fn test_snoozed_alarm_rings_again() {
            let (mut engine, clock, _rx) = engine_at(at(8, 0, 0));
            let id = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine.evaluate();
            engine.snooze(id);

            clock.set(at(8, 10, 0));
            assert_eq!(engine.evaluate(), vec![id]);
            assert_eq!(engine.get(id).unwrap().snooze_count, 1);
        }

        #[test]
        fn test_snooze_resorts() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            let first = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let second = engine
                .add_alarm(at(8, 5, 0), "", AlarmOptions::default())
                .unwrap();

            engine.snooze(first);

            let ids: Vec<_> = engine.alarms().iter().map(|a| a.id).collect();
            assert_eq!(ids, vec![second, first]);
        }

        #[test]
        fn test_stop_all_silences_everything() {
            let (mut engine, _clock, mut rx) = engine_at(at(9, 0, 0));
            let a = engine
                .add_alarm(at(9, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let b = engine
                .add_alarm(at(9, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine.evaluate();
            drain(&mut rx);

            assert_eq!(engine.stop_all(), 2);

            assert!(!engine.is_any_ringing());
            assert_eq!(
                drain(&mut rx),
                vec![AlarmEvent::Silenced { id: a }, AlarmEvent::Silenced { id: b }]
            );
        }

        #[test]
        fn test_set_ringing_requires_active() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            let id = engine
                .add_alarm(at(12, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine.toggle_alarm(id);

            assert!(!engine.set_alarm_ringing(id, true));
            assert!(!engine.get(id).unwrap().is_ringing);

            engine.toggle_alarm(id);
            assert!(engine.set_alarm_ringing(id, true));
            assert!(engine.get(id).unwrap().is_ringing);
            assert!(engine.set_alarm_ringing(id, false));
            assert!(!engine.is_any_ringing());
        }

        #[test]
        fn test_toggle_off_clears_ringing() {
            let (mut engine, _clock, mut rx) = engine_at(at(8, 0, 0));
            let id = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine.evaluate();
            drain(&mut rx);

            assert_eq!(engine.toggle_alarm(id), Some(false));

            let alarm = engine.get(id).unwrap();
            assert!(!alarm.is_active);
            assert!(!alarm.is_ringing);
            assert_eq!(drain(&mut rx), vec![AlarmEvent::Silenced { id }]);
        }

        #[test]
        fn test_unknown_ids_are_noops() {
            let (mut engine, _clock, mut rx) = engine_at(at(8, 0, 0));
            let ghost = Uuid::new_v4();

            assert_eq!(engine.snooze(ghost), None);
            assert_eq!(engine.toggle_alarm(ghost), None);
            assert!(!engine.remove_alarm(ghost));
            assert!(!engine.set_alarm_ringing(ghost, true));
            assert_eq!(engine.duplicate(ghost), None);
            assert_eq!(engine.edit_alarm(ghost, AlarmPatch::default()), Ok(false));
            assert!(drain(&mut rx).is_empty());
        }
    }

    // ------------------------------------------------------------------------
    // Collection Tests
    // ------------------------------------------------------------------------

    mod collection_tests {
        use super::*;

        #[test]
        fn test_alarms_stay_sorted_and_stable() {
            let (mut engine, _clock, _rx) = engine_at(at(6, 0, 0));
            let late = engine
                .add_alarm(at(9, 0, 0), "late", AlarmOptions::default())
                .unwrap();
            let early = engine
                .add_alarm(at(7, 0, 0), "early", AlarmOptions::default())
                .unwrap();
            let late_twin = engine
                .add_alarm(at(9, 0, 0), "late twin", AlarmOptions::default())
                .unwrap();

            let ids: Vec<_> = engine.alarms().iter().map(|a| a.id).collect();
            assert_eq!(ids, vec![early, late, late_twin]);
        }

        #[test]
        fn test_add_alarm_uses_settings_defaults() {
            let (mut engine, _clock, _rx) = engine_at(at(6, 0, 0));
            let id = engine
                .add_alarm(at(7, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let alarm = engine.get(id).unwrap();

            assert_eq!(alarm.sound, "clock");
            assert!((alarm.volume - 0.7).abs() < f32::EPSILON);
            assert!(alarm.is_active);
            assert_eq!(alarm.created_at, at(6, 0, 0));
        }

        #[test]
        fn test_add_alarm_rejects_unknown_sound() {
            let (mut engine, _clock, _rx) = engine_at(at(6, 0, 0));
            let options = AlarmOptions {
                sound: Some("kazoo".to_string()),
                ..AlarmOptions::default()
            };
            assert_eq!(
                engine.add_alarm(at(7, 0, 0), "", options),
                Err(AlarmError::UnknownSound("kazoo".to_string()))
            );
            assert!(engine.alarms().is_empty());
        }

        #[test]
        fn test_add_alarm_clamps_volume() {
            let (mut engine, _clock, _rx) = engine_at(at(6, 0, 0));
            let options = AlarmOptions {
                volume: Some(4.0),
                ..AlarmOptions::default()
            };
            let id = engine.add_alarm(at(7, 0, 0), "", options).unwrap();
            assert_eq!(engine.get(id).unwrap().volume, 1.0);
        }

        #[test]
        fn test_quick_alarm() {
            let (mut engine, _clock, _rx) = engine_at(at(6, 0, 15));
            let id = engine.add_quick_alarm(5).unwrap();
            let alarm = engine.get(id).unwrap();

            assert_eq!(alarm.time, at(6, 5, 15));
            assert_eq!(alarm.label, "in 5 min");
        }

        #[test]
        fn test_preset_rolls_forward_when_passed() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            let id = engine.add_preset_alarm(7, 0, "07:00").unwrap();
            assert_eq!(
                engine.get(id).unwrap().time,
                at(7, 0, 0) + Duration::days(1)
            );
        }

        #[test]
        fn test_preset_today_when_ahead() {
            let (mut engine, _clock, _rx) = engine_at(at(6, 0, 0));
            let id = engine.add_preset_alarm(7, 0, "07:00").unwrap();
            assert_eq!(engine.get(id).unwrap().time, at(7, 0, 0));
        }

        #[test]
        fn test_preset_rejects_invalid_time() {
            let (mut engine, _clock, _rx) = engine_at(at(6, 0, 0));
            assert_eq!(
                engine.add_preset_alarm(7, 60, ""),
                Err(AlarmError::InvalidTime { hour: 7, minute: 60 })
            );
        }

        #[test]
        fn test_remove_ringing_alarm_silences() {
            let (mut engine, _clock, mut rx) = engine_at(at(8, 0, 0));
            let id = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine.evaluate();
            drain(&mut rx);

            assert!(engine.remove_alarm(id));
            assert!(engine.alarms().is_empty());
            assert_eq!(drain(&mut rx), vec![AlarmEvent::Silenced { id }]);
        }

        #[test]
        fn test_duplicate_copies_to_next_day() {
            let (mut engine, _clock, _rx) = engine_at(at(6, 0, 0));
            let options = AlarmOptions {
                sound: Some("bell".to_string()),
                volume: Some(0.4),
                is_recurring: true,
                recurring_days: vec![1, 3, 5],
                ..AlarmOptions::default()
            };
            let id = engine.add_alarm(at(7, 0, 0), "Gym", options).unwrap();

            let copy_id = engine.duplicate(id).unwrap();

            assert_ne!(copy_id, id);
            let copy = engine.get(copy_id).unwrap();
            assert_eq!(copy.time, at(7, 0, 0) + Duration::days(1));
            assert_eq!(copy.label, "Gym (copy)");
            assert_eq!(copy.sound, "bell");
            assert!((copy.volume - 0.4).abs() < f32::EPSILON);
            assert!(copy.is_recurring);
            assert_eq!(copy.recurring_days, vec![1, 3, 5]);
            assert_eq!(engine.get(id).unwrap().label, "Gym");
        }

        #[test]
        fn test_edit_resorts_and_silences_on_deactivate() {
            let (mut engine, _clock, mut rx) = engine_at(at(8, 0, 0));
            let ringing = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let other = engine
                .add_alarm(at(8, 30, 0), "", AlarmOptions::default())
                .unwrap();
            engine.evaluate();
            drain(&mut rx);

            let patch = AlarmPatch {
                time: Some(at(9, 0, 0)),
                is_active: Some(false),
                label: Some("later".to_string()),
                ..AlarmPatch::default()
            };
            assert_eq!(engine.edit_alarm(ringing, patch), Ok(true));

            let ids: Vec<_> = engine.alarms().iter().map(|a| a.id).collect();
            assert_eq!(ids, vec![other, ringing]);
            let alarm = engine.get(ringing).unwrap();
            assert!(!alarm.is_ringing);
            assert_eq!(alarm.label, "later");
            assert_eq!(drain(&mut rx), vec![AlarmEvent::Silenced { id: ringing }]);
        }

        #[test]
        fn test_edit_rejects_unknown_sound() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            let id = engine
                .add_alarm(at(9, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let patch = AlarmPatch {
                sound: Some("kazoo".to_string()),
                ..AlarmPatch::default()
            };
            assert!(engine.edit_alarm(id, patch).is_err());
            assert_eq!(engine.get(id).unwrap().sound, "clock");
        }

        #[test]
        fn test_clear_expired_keeps_ringing_future_and_recurring() {
            let (mut engine, clock, _rx) = engine_at(at(7, 0, 0));
            let ringing = engine
                .add_alarm(at(7, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine.evaluate();
            let recurring = engine
                .add_alarm(
                    at(6, 0, 0),
                    "",
                    AlarmOptions {
                        is_recurring: true,
                        ..AlarmOptions::default()
                    },
                )
                .unwrap();
            let future = engine
                .add_alarm(at(9, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine
                .add_alarm(at(6, 30, 0), "", AlarmOptions::default())
                .unwrap();
            clock.set(at(8, 0, 0));

            assert_eq!(engine.clear_expired(), 1);

            let mut ids: Vec<_> = engine.alarms().iter().map(|a| a.id).collect();
            ids.sort();
            let mut expected = vec![ringing, recurring, future];
            expected.sort();
            assert_eq!(ids, expected);
        }

        #[test]
        fn test_clear_expired_removes_alarm_at_exactly_now() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            assert_eq!(engine.clear_expired(), 1);
        }

        #[test]
        fn test_restore_clears_ringing_and_expired() {
            let (mut source, _clock, _rx) = engine_at(at(6, 0, 0));
            let past = source
                .add_alarm(at(6, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let future = source
                .add_alarm(at(9, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let mut saved = source.alarms().to_vec();
            saved.iter_mut().for_each(|a| a.is_ringing = true);

            let (mut engine, _clock, mut rx) = engine_at(at(7, 0, 0));
            engine.restore(saved);

            assert!(engine.get(past).is_none());
            assert!(!engine.get(future).unwrap().is_ringing);
            assert!(drain(&mut rx).is_empty());
        }
    }

    // ------------------------------------------------------------------------
    // Query / Settings Tests
    // ------------------------------------------------------------------------

    mod query_tests {
        use super::*;

        #[test]
        fn test_next_alarm_skips_inactive_and_past() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            engine
                .add_alarm(at(7, 0, 0), "past", AlarmOptions::default())
                .unwrap();
            let off = engine
                .add_alarm(at(8, 30, 0), "off", AlarmOptions::default())
                .unwrap();
            engine.toggle_alarm(off);
            let next = engine
                .add_alarm(at(9, 0, 0), "next", AlarmOptions::default())
                .unwrap();

            assert_eq!(engine.next_alarm().map(|a| a.id), Some(next));
        }

        #[test]
        fn test_resolve_id_by_prefix() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            let id = engine
                .add_alarm(at(9, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let short = engine.get(id).unwrap().short_id();

            assert_eq!(engine.resolve_id(&short), Some(id));
            assert_eq!(engine.resolve_id("not-an-id"), None);
        }

        #[test]
        fn test_snooze_setting_is_clamped() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            engine.set_snooze_minutes(0);
            assert_eq!(engine.settings().snooze_minutes, 1);
            engine.set_snooze_minutes(120);
            assert_eq!(engine.settings().snooze_minutes, 60);
        }

        #[test]
        fn test_default_sound_setting_validated() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            assert!(engine.set_default_sound("kazoo").is_err());
            engine.set_default_sound("bell").unwrap();

            let id = engine
                .add_alarm(at(9, 0, 0), "", AlarmOptions::default())
                .unwrap();
            assert_eq!(engine.get(id).unwrap().sound, "bell");
        }

        #[test]
        fn test_reload_adopts_stored_alarms_and_settings() {
            let (mut engine, _clock, _rx) = engine_at(at(8, 0, 0));
            engine
                .add_alarm(at(9, 0, 0), "", AlarmOptions::default())
                .unwrap();

            let mut other = engine_at(at(8, 0, 0)).0;
            let added = other
                .add_alarm(at(10, 0, 0), "Added elsewhere", AlarmOptions::default())
                .unwrap();
            other.set_snooze_minutes(30);

            engine.reload(other.alarms().to_vec(), other.settings().clone());

            let ids: Vec<_> = engine.alarms().iter().map(|a| a.id).collect();
            assert_eq!(ids, vec![added]);
            assert_eq!(engine.settings().snooze_minutes, 30);
        }

        #[test]
        fn test_reload_keeps_ringing_alarm_still_present() {
            let (mut engine, _clock, mut rx) = engine_at(at(8, 0, 0));
            let id = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine.evaluate();
            drain(&mut rx);

            let mut stored = engine.alarms().to_vec();
            stored[0].is_ringing = false;
            stored[0].label = "Renamed".to_string();
            engine.reload(stored, AlarmSettings::default());

            let alarm = engine.get(id).unwrap();
            assert!(alarm.is_ringing);
            assert_eq!(alarm.label, "Renamed");
            assert_eq!(alarm.last_triggered, Some(at(8, 0, 0)));
            assert!(drain(&mut rx).is_empty());
        }

        #[test]
        fn test_reload_silences_removed_or_deactivated_alarms() {
            let (mut engine, _clock, mut rx) = engine_at(at(8, 0, 0));
            let removed = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            let deactivated = engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            engine.evaluate();
            drain(&mut rx);

            let mut stored: Vec<Alarm> = engine
                .alarms()
                .iter()
                .filter(|a| a.id == deactivated)
                .cloned()
                .collect();
            stored[0].is_active = false;
            stored[0].is_recurring = true;
            engine.reload(stored, AlarmSettings::default());

            assert!(engine.get(removed).is_none());
            assert!(!engine.get(deactivated).unwrap().is_ringing);
            let mut events = drain(&mut rx);
            events.sort_by_key(AlarmEvent::id);
            let mut expected = vec![
                AlarmEvent::Silenced { id: removed },
                AlarmEvent::Silenced { id: deactivated },
            ];
            expected.sort_by_key(AlarmEvent::id);
            assert_eq!(events, expected);
        }

        #[test]
        fn test_works_without_event_channel() {
            let clock = Arc::new(ManualClock::new(at(8, 0, 0)));
            let mut engine = AlarmTriggerEngine::new(AlarmSettings::default(), clock);
            engine
                .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
                .unwrap();
            assert_eq!(engine.evaluate().len(), 1);
            assert_eq!(engine.stop_all(), 1);
        }
    }
}

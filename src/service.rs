//! The alarm service.
//!
//! Wires the components together:
//!
//! ```text
//! ┌──────────────────┐ alarm-check ┌──────────────────┐ AlarmEvent ┌──────────────────────┐
//! │PrecisionScheduler│────────────▶│AlarmTriggerEngine│───────────▶│ RingingCoordinator   │
//! └──────────────────┘   (1 s)     └──────────────────┘            │  ├─ AudioEngine      │
//!                                                                  │  └─ NotificationBridge│
//!                                                                  └──────────────────────┘
//! ```
//!
//! The first ringing alarm's sound plays at that alarm's volume; audio stops
//! once no alarm is ringing. Sound, wake-lock and notification failures are
//! logged and never change alarm state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::alarm::{
    Alarm, AlarmError, AlarmEvent, AlarmOptions, AlarmPatch, AlarmSettings, AlarmTriggerEngine,
};
use crate::audio::{AudioEngine, AudioError, DEFAULT_TEST_DURATION};
use crate::clock::Clock;
use crate::config::ALARM_CHECK_INTERVAL_MS;
use crate::notification::{NotificationBridge, Notifier};
use crate::scheduler::{PrecisionScheduler, SchedulerConfig, SchedulerError, SchedulerStats};
use crate::store::StoredState;

/// Scheduler subscription that evaluates alarms.
pub const ALARM_CHECK_TIMER: &str = "alarm-check";

type SharedEngine = Arc<Mutex<AlarmTriggerEngine>>;

fn lock_engine(engine: &SharedEngine) -> MutexGuard<'_, AlarmTriggerEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// RingingCoordinator
// ============================================================================

/// Follows ringing transitions with sound and notifications.
pub struct RingingCoordinator {
    engine: SharedEngine,
    audio: Arc<AudioEngine>,
    bridge: Mutex<NotificationBridge>,
    sounding: AtomicBool,
}

impl RingingCoordinator {
    fn new(engine: SharedEngine, audio: Arc<AudioEngine>, bridge: NotificationBridge) -> Self {
        Self {
            engine,
            audio,
            bridge: Mutex::new(bridge),
            sounding: AtomicBool::new(false),
        }
    }

    /// Applies one engine event.
    ///
    /// If the notifier turned out to be unusable, the notification setting
    /// is switched off so the saved state matches.
    pub async fn handle(&self, event: &AlarmEvent) {
        let notifying = {
            let mut bridge = self.lock_bridge();
            bridge.handle_event(event);
            bridge.is_enabled()
        };
        if !notifying {
            lock_engine(&self.engine).set_notifications_enabled(false);
        }
        self.reconcile_audio().await;
    }

    /// Starts the first ringing alarm's sound if nothing of ours is playing,
    /// or stops our sound if nothing rings.
    async fn reconcile_audio(&self) {
        let first = lock_engine(&self.engine)
            .ringing_alarms()
            .first()
            .map(|a| (a.id, a.sound.clone(), a.volume));

        match first {
            Some((id, sound, volume)) => {
                if self.sounding.load(Ordering::SeqCst) && self.audio.is_currently_playing() {
                    return;
                }
                self.audio.set_volume(volume);
                match self.audio.play(&sound).await {
                    Ok(()) => {
                        self.sounding.store(true, Ordering::SeqCst);
                        debug!(alarm = %id, sound = %sound, "Alarm sound started");
                    }
                    Err(e) => warn!(alarm = %id, "Failed to play alarm sound: {}", e),
                }
            }
            None => {
                if self.sounding.swap(false, Ordering::SeqCst) {
                    self.audio.stop();
                    debug!("No alarm ringing, sound stopped");
                }
            }
        }
    }

    fn lock_bridge(&self) -> MutexGuard<'_, NotificationBridge> {
        self.bridge.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RingingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingingCoordinator")
            .field("sounding", &self.sounding.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AlarmService
// ============================================================================

/// Owns the scheduler, trigger engine, audio and notifications.
pub struct AlarmService {
    engine: SharedEngine,
    scheduler: PrecisionScheduler,
    coordinator: Arc<RingingCoordinator>,
    events: Mutex<Option<UnboundedReceiver<AlarmEvent>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl AlarmService {
    /// Builds a stopped service. Call [`start`](Self::start) to begin
    /// checking alarms.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for an invalid scheduler
    /// configuration.
    pub fn new(
        scheduler_config: SchedulerConfig,
        settings: AlarmSettings,
        clock: Arc<dyn Clock>,
        audio: AudioEngine,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, SchedulerError> {
        let scheduler = PrecisionScheduler::new(scheduler_config, Arc::clone(&clock))?;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut settings = settings;
        let mut bridge = NotificationBridge::new(notifier, false);
        settings.enable_notifications = bridge.set_enabled(settings.enable_notifications);
        let engine: SharedEngine = Arc::new(Mutex::new(
            AlarmTriggerEngine::new(settings, clock).with_events(tx),
        ));

        let check_engine = Arc::clone(&engine);
        scheduler.add_timer(
            ALARM_CHECK_TIMER,
            Duration::from_millis(ALARM_CHECK_INTERVAL_MS),
            move || {
                lock_engine(&check_engine).evaluate();
                Ok(())
            },
        );

        let coordinator = Arc::new(RingingCoordinator::new(
            Arc::clone(&engine),
            Arc::new(audio),
            bridge,
        ));

        Ok(Self {
            engine,
            scheduler,
            coordinator,
            events: Mutex::new(Some(rx)),
            event_task: Mutex::new(None),
        })
    }

    /// Loads persisted alarms. Expired ones are dropped.
    pub fn restore(&self, alarms: Vec<Alarm>) {
        self.engine().restore(alarms);
    }

    /// Starts the scheduler and the event consumer.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NoRuntime` outside a tokio runtime and
    /// `SchedulerError::Disposed` after shutdown.
    pub fn start(&self) -> Result<(), SchedulerError> {
        self.scheduler.start()?;

        let receiver = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut receiver) = receiver {
            let coordinator = Arc::clone(&self.coordinator);
            let task = tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    coordinator.handle(&event).await;
                }
            });
            *self.lock_event_task() = Some(task);
        }

        debug!("Alarm service started");
        Ok(())
    }

    /// Runs one scheduler evaluation now.
    pub fn poll(&self) {
        self.scheduler.poll();
    }

    /// Adopts alarms and settings another process wrote to the store.
    pub fn reload(&self, state: StoredState) {
        let StoredState {
            alarms,
            mut settings,
        } = state;
        let was_enabled = self.coordinator.lock_bridge().is_enabled();
        settings.enable_notifications = self
            .coordinator
            .lock_bridge()
            .set_enabled(settings.enable_notifications);
        self.engine().reload(alarms, settings);
        if !was_enabled && self.coordinator.lock_bridge().is_enabled() {
            self.notify_ringing();
        }
    }

    /// Marks the alarm check as due, e.g. after the host wakes from sleep.
    pub fn force_sync(&self) {
        self.scheduler.force_sync();
    }

    /// Evaluates alarms immediately, bypassing the scheduler.
    pub fn check_alarms(&self) -> Vec<Uuid> {
        self.engine().evaluate()
    }

    // ------------------------------------------------------------------------
    // Alarm operations
    // ------------------------------------------------------------------------

    /// Adds an alarm at `time`.
    ///
    /// # Errors
    ///
    /// Returns `AlarmError::UnknownSound` for a sound not in the catalog.
    pub fn add_alarm(
        &self,
        time: NaiveDateTime,
        label: impl Into<String>,
        options: AlarmOptions,
    ) -> Result<Uuid, AlarmError> {
        self.engine().add_alarm(time, label, options)
    }

    /// Adds an alarm `minutes` from now.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`add_alarm`](Self::add_alarm).
    pub fn add_quick_alarm(&self, minutes: u32) -> Result<Uuid, AlarmError> {
        self.engine().add_quick_alarm(minutes)
    }

    /// Adds an alarm at the next `hour:minute`.
    ///
    /// # Errors
    ///
    /// Returns `AlarmError::InvalidTime` for an out-of-range time.
    pub fn add_preset_alarm(
        &self,
        hour: u32,
        minute: u32,
        label: impl Into<String>,
    ) -> Result<Uuid, AlarmError> {
        self.engine().add_preset_alarm(hour, minute, label)
    }

    pub fn remove_alarm(&self, id: Uuid) -> bool {
        self.engine().remove_alarm(id)
    }

    pub fn toggle_alarm(&self, id: Uuid) -> Option<bool> {
        self.engine().toggle_alarm(id)
    }

    pub fn snooze_alarm(&self, id: Uuid) -> Option<NaiveDateTime> {
        self.engine().snooze(id)
    }

    /// Snoozes every ringing alarm. Returns how many were snoozed.
    pub fn snooze_ringing(&self) -> usize {
        let mut engine = self.engine();
        let ringing: Vec<Uuid> = engine.ringing_alarms().iter().map(|a| a.id).collect();
        ringing
            .into_iter()
            .filter(|id| engine.snooze(*id).is_some())
            .count()
    }

    pub fn stop_all_alarms(&self) -> usize {
        self.engine().stop_all()
    }

    /// Silences one alarm.
    pub fn stop_alarm(&self, id: Uuid) -> bool {
        self.engine().set_alarm_ringing(id, false)
    }

    pub fn set_alarm_ringing(&self, id: Uuid, ringing: bool) -> bool {
        self.engine().set_alarm_ringing(id, ringing)
    }

    /// # Errors
    ///
    /// Returns `AlarmError::UnknownSound` if the patch names an unknown sound.
    pub fn edit_alarm(&self, id: Uuid, patch: AlarmPatch) -> Result<bool, AlarmError> {
        self.engine().edit_alarm(id, patch)
    }

    pub fn duplicate_alarm(&self, id: Uuid) -> Option<Uuid> {
        self.engine().duplicate(id)
    }

    pub fn clear_expired_alarms(&self) -> usize {
        self.engine().clear_expired()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Snapshot of all alarms, sorted by time.
    #[must_use]
    pub fn alarms(&self) -> Vec<Alarm> {
        self.engine().alarms().to_vec()
    }

    #[must_use]
    pub fn get_alarm(&self, id: Uuid) -> Option<Alarm> {
        self.engine().get(id).cloned()
    }

    #[must_use]
    pub fn resolve_id(&self, prefix: &str) -> Option<Uuid> {
        self.engine().resolve_id(prefix)
    }

    #[must_use]
    pub fn next_alarm(&self) -> Option<Alarm> {
        self.engine().next_alarm().cloned()
    }

    #[must_use]
    pub fn is_any_ringing(&self) -> bool {
        self.engine().is_any_ringing()
    }

    #[must_use]
    pub fn settings(&self) -> AlarmSettings {
        self.engine().settings().clone()
    }

    /// State to persist.
    #[must_use]
    pub fn snapshot(&self) -> StoredState {
        let engine = self.engine();
        StoredState::new(engine.alarms().to_vec(), engine.settings().clone())
    }

    #[must_use]
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.get_stats()
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    pub fn set_snooze_minutes(&self, minutes: u32) {
        self.engine().set_snooze_minutes(minutes);
    }

    /// Turns notifications on or off. Returns the effective state, which is
    /// off if permission was denied.
    pub fn set_notifications_enabled(&self, enabled: bool) -> bool {
        let was_enabled = self.coordinator.lock_bridge().is_enabled();
        let effective = self.coordinator.lock_bridge().set_enabled(enabled);
        self.engine().set_notifications_enabled(effective);
        if !was_enabled && effective {
            self.notify_ringing();
        }
        effective
    }

    /// Shows notifications for alarms that were already ringing.
    fn notify_ringing(&self) {
        let engine = self.engine();
        let mut bridge = self.coordinator.lock_bridge();
        for alarm in engine.ringing_alarms() {
            bridge.on_ringing_changed(alarm, true);
        }
    }

    // ------------------------------------------------------------------------
    // Audio
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn is_audio_playing(&self) -> bool {
        self.coordinator.audio.is_currently_playing()
    }

    #[must_use]
    pub fn get_current_volume(&self) -> f32 {
        self.coordinator.audio.get_volume()
    }

    pub fn set_volume(&self, volume: f32) {
        self.coordinator.audio.set_volume(volume);
    }

    /// Previews a sound for `duration`, or the default preview length.
    ///
    /// # Errors
    ///
    /// Returns the audio engine's error if playback cannot start.
    pub async fn test_sound(
        &self,
        sound_id: &str,
        duration: Option<Duration>,
    ) -> Result<(), AudioError> {
        self.coordinator
            .audio
            .test_sound(sound_id, duration.unwrap_or(DEFAULT_TEST_DURATION))
            .await
    }

    #[must_use]
    pub fn audio(&self) -> &AudioEngine {
        &self.coordinator.audio
    }

    /// Number of outstanding notifications.
    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.coordinator.lock_bridge().outstanding_count()
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Stops ticking, silences audio and closes notifications.
    ///
    /// Alarm state is left as is so it can still be saved. Safe to call
    /// repeatedly.
    pub fn shutdown(&self) {
        self.scheduler.dispose();
        if let Some(task) = self.lock_event_task().take() {
            task.abort();
        }
        self.coordinator.lock_bridge().close_all();
        self.coordinator.sounding.store(false, Ordering::SeqCst);
        self.coordinator.audio.dispose();
        debug!("Alarm service shut down");
    }

    fn engine(&self) -> MutexGuard<'_, AlarmTriggerEngine> {
        lock_engine(&self.engine)
    }

    fn lock_event_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.event_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AlarmService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AlarmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmService")
            .field("scheduler", &self.scheduler)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

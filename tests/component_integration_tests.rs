//! Component integration tests.
//!
//! Wire the scheduler, trigger engine, audio engine and notification bridge
//! together with a manual clock and mock backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::mpsc;

use alarm_clock::alarm::{AlarmEvent, AlarmOptions, AlarmSettings, AlarmTriggerEngine};
use alarm_clock::audio::{AudioConfig, AudioEngine, MockAudioBackend, MockWakeLock, WakeLock};
use alarm_clock::clock::ManualClock;
use alarm_clock::notification::{MockNotifier, NotificationBridge};
use alarm_clock::scheduler::{PrecisionScheduler, SchedulerConfig};
use alarm_clock::service::AlarmService;

// ============================================================================
// Test Helpers
// ============================================================================

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 20)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

fn engine_at(start: NaiveDateTime) -> (AlarmTriggerEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let engine = AlarmTriggerEngine::new(AlarmSettings::default(), clock.clone());
    (engine, clock)
}

fn audio_engine() -> (AudioEngine, Arc<MockAudioBackend>, Arc<MockWakeLock>) {
    let backend = Arc::new(MockAudioBackend::new());
    let wake_lock = Arc::new(MockWakeLock::new());
    let engine = AudioEngine::new(AudioConfig::default(), backend.factory(), wake_lock.clone());
    (engine, backend, wake_lock)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

// ============================================================================
// Trigger scenarios
// ============================================================================

mod trigger_integration {
    use super::*;

    #[test]
    fn tc_alarm_rings_thirty_seconds_into_its_minute() {
        let (mut engine, clock) = engine_at(at(7, 59, 59));
        let id = engine
            .add_alarm(at(8, 0, 0), "Morning", AlarmOptions::default())
            .unwrap();

        assert!(engine.evaluate().is_empty());

        clock.advance(Duration::from_secs(31));
        assert_eq!(engine.evaluate(), vec![id]);

        let alarm = engine.get(id).unwrap();
        assert!(alarm.is_ringing);
        assert_eq!(alarm.last_triggered, Some(at(8, 0, 30)));

        // Still ringing on later ticks, no second trigger.
        clock.advance(Duration::from_secs(1));
        assert!(engine.evaluate().is_empty());
    }

    #[test]
    fn tc_matching_window_is_the_whole_minute_only() {
        let (mut engine, clock) = engine_at(at(7, 59, 59));
        engine
            .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
            .unwrap();
        assert!(engine.evaluate().is_empty());

        let last_ms = at(8, 0, 59) + chrono::Duration::milliseconds(999);
        clock.set(last_ms);
        assert_eq!(engine.evaluate().len(), 1);

        let (mut late, late_clock) = engine_at(at(8, 1, 0));
        late.add_alarm(at(8, 0, 0), "", AlarmOptions::default())
            .unwrap();
        assert!(late.evaluate().is_empty());
        late_clock.advance(Duration::from_secs(30));
        assert!(late.evaluate().is_empty());
    }

    #[test]
    fn tc_snooze_moves_alarm_ten_minutes_from_now() {
        let (mut engine, _clock) = engine_at(at(8, 0, 30));
        let id = engine
            .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
            .unwrap();
        engine.evaluate();

        assert_eq!(engine.snooze(id), Some(at(8, 10, 30)));

        let alarm = engine.get(id).unwrap();
        assert!(!alarm.is_ringing);
        assert_eq!(alarm.snooze_count, 1);
        assert!(alarm.time > at(8, 0, 0));
    }

    #[test]
    fn tc_two_alarms_at_nine_ring_together_and_stop_together() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let mut engine =
            AlarmTriggerEngine::new(AlarmSettings::default(), clock).with_events(tx);
        engine
            .add_alarm(at(9, 0, 0), "first", AlarmOptions::default())
            .unwrap();
        engine
            .add_alarm(at(9, 0, 0), "second", AlarmOptions::default())
            .unwrap();

        assert_eq!(engine.evaluate().len(), 2);
        assert_eq!(engine.ringing_alarms().len(), 2);

        assert_eq!(engine.stop_all(), 2);
        assert!(!engine.is_any_ringing());

        let mut ringing = 0;
        let mut silenced = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                AlarmEvent::Ringing { .. } => ringing += 1,
                AlarmEvent::Silenced { .. } => silenced += 1,
                AlarmEvent::Snoozed { .. } => {}
            }
        }
        assert_eq!((ringing, silenced), (2, 2));
    }

    #[test]
    fn tc_toggle_off_clears_ringing() {
        let (mut engine, _clock) = engine_at(at(6, 30, 0));
        let id = engine
            .add_alarm(at(6, 30, 0), "", AlarmOptions::default())
            .unwrap();
        engine.evaluate();

        assert_eq!(engine.toggle_alarm(id), Some(false));
        let alarm = engine.get(id).unwrap();
        assert!(!alarm.is_active);
        assert!(!alarm.is_ringing);
    }

    #[test]
    fn tc_preset_rolls_forward_only_when_passed() {
        let (mut early, _c1) = engine_at(at(6, 0, 0));
        let id = early.add_preset_alarm(7, 0, "").unwrap();
        assert_eq!(early.get(id).unwrap().time, at(7, 0, 0));

        let (mut late, _c2) = engine_at(at(8, 0, 0));
        let id = late.add_preset_alarm(7, 0, "").unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 5, 21)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap();
        assert_eq!(late.get(id).unwrap().time, tomorrow);
    }

    #[test]
    fn tc_clear_expired_keeps_ringing_and_recurring() {
        let (mut engine, clock) = engine_at(at(7, 0, 0));
        let ringing = engine
            .add_alarm(at(7, 0, 0), "ringing", AlarmOptions::default())
            .unwrap();
        let recurring = engine
            .add_alarm(
                at(6, 0, 0),
                "recurring",
                AlarmOptions {
                    is_recurring: true,
                    recurring_days: vec![1, 2, 3, 4, 5],
                    ..AlarmOptions::default()
                },
            )
            .unwrap();
        engine
            .add_alarm(at(5, 0, 0), "past", AlarmOptions::default())
            .unwrap();
        let future = engine
            .add_alarm(at(9, 0, 0), "future", AlarmOptions::default())
            .unwrap();
        engine.evaluate();
        clock.advance(Duration::from_secs(120));

        assert_eq!(engine.clear_expired(), 1);
        let ids: Vec<_> = engine.alarms().iter().map(|a| a.id).collect();
        assert!(ids.contains(&ringing));
        assert!(ids.contains(&recurring));
        assert!(ids.contains(&future));
    }
}

// ============================================================================
// Audio scenarios
// ============================================================================

mod audio_integration {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tc_play_then_play_leaves_one_session() {
        let (audio, backend, _wake_lock) = audio_engine();

        audio.play("bell").await.unwrap();
        audio.play("siren").await.unwrap();

        assert_eq!(audio.active_session_count(), 1);
        assert_eq!(audio.current_sound(), Some("siren"));
        assert_eq!(backend.live_count(), audio.tracked_voice_count());
    }

    #[tokio::test(start_paused = true)]
    async fn tc_stop_halts_synthesis_while_time_passes() {
        let (audio, backend, wake_lock) = audio_engine();
        audio.play("beep").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        audio.stop();
        let started = backend.started_count();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(!audio.is_currently_playing());
        assert_eq!(backend.started_count(), started);
        assert_eq!(audio.tracked_voice_count(), 0);
        assert_eq!(backend.live_count(), 0);
        assert!(!wake_lock.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn tc_no_voice_growth_across_play_stop_cycles() {
        let (audio, backend, _wake_lock) = audio_engine();

        for sound in ["clock", "bell", "alien", "rain", "bomb"] {
            audio.play(sound).await.unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;
            audio.stop();
            assert_eq!(audio.tracked_voice_count(), 0);
            assert_eq!(backend.live_count(), 0);
        }
    }
}

// ============================================================================
// Scheduler scenarios
// ============================================================================

mod scheduler_integration {
    use super::*;

    #[test]
    fn tc_poll_drives_alarm_check_with_manual_clock() {
        let clock = Arc::new(ManualClock::new(at(7, 59, 58)));
        let engine = Arc::new(Mutex::new(AlarmTriggerEngine::new(
            AlarmSettings::default(),
            clock.clone(),
        )));
        engine
            .lock()
            .unwrap()
            .add_alarm(at(8, 0, 0), "", AlarmOptions::default())
            .unwrap();

        let scheduler =
            PrecisionScheduler::new(SchedulerConfig::foreground(), clock.clone()).unwrap();
        let checks = Arc::new(AtomicUsize::new(0));
        let (check_engine, check_count) = (engine.clone(), checks.clone());
        scheduler.add_timer("alarm-check", Duration::from_secs(1), move || {
            check_count.fetch_add(1, Ordering::SeqCst);
            check_engine.lock().unwrap().evaluate();
            Ok(())
        });

        for _ in 0..3 {
            clock.advance(Duration::from_secs(1));
            scheduler.poll();
        }

        assert_eq!(checks.load(Ordering::SeqCst), 3);
        assert!(engine.lock().unwrap().is_any_ringing());
    }

    #[test]
    fn tc_disabled_check_does_not_trigger() {
        let clock = Arc::new(ManualClock::new(at(8, 0, 0)));
        let scheduler =
            PrecisionScheduler::new(SchedulerConfig::foreground(), clock.clone()).unwrap();
        let checks = Arc::new(AtomicUsize::new(0));
        let count = checks.clone();
        scheduler.add_timer("alarm-check", Duration::from_secs(1), move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        scheduler.disable_timer("alarm-check");
        clock.advance(Duration::from_secs(5));
        scheduler.poll();
        assert_eq!(checks.load(Ordering::SeqCst), 0);

        scheduler.enable_timer("alarm-check");
        scheduler.poll();
        assert_eq!(checks.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(1));
        scheduler.poll();
        assert_eq!(checks.load(Ordering::SeqCst), 1);

        let stats = scheduler.get_stats();
        assert_eq!(stats.total_timers, 1);
        assert_eq!(stats.active_timers, 1);
    }
}

// ============================================================================
// Notification scenarios
// ============================================================================

mod notification_integration {
    use super::*;

    #[test]
    fn tc_bridge_follows_engine_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let clock = Arc::new(ManualClock::new(at(7, 15, 0)));
        let mut engine =
            AlarmTriggerEngine::new(AlarmSettings::default(), clock).with_events(tx);
        let notifier = Arc::new(MockNotifier::new());
        let mut bridge = NotificationBridge::new(notifier.clone(), true);

        let labelled = engine
            .add_alarm(at(7, 15, 0), "Pills", AlarmOptions::default())
            .unwrap();
        engine
            .add_alarm(at(7, 15, 0), "", AlarmOptions::default())
            .unwrap();
        engine.evaluate();
        engine.snooze(labelled);

        while let Ok(event) = rx.try_recv() {
            bridge.handle_event(&event);
        }

        let shown = notifier.shown();
        assert_eq!(shown.len(), 2);
        assert!(shown.iter().any(|n| n.body == "Pills"));
        assert!(shown.iter().any(|n| n.body == "Alarm time: 07:15"));
        assert_eq!(notifier.closed(), vec![format!("alarm-{}", labelled)]);
        assert_eq!(bridge.outstanding_count(), 1);
    }
}

// ============================================================================
// Full service
// ============================================================================

mod service_integration {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tc_service_rings_plays_and_silences() {
        let clock = Arc::new(ManualClock::new(at(7, 59, 50)));
        let (audio, backend, wake_lock) = audio_engine();
        let notifier = Arc::new(MockNotifier::new());
        let service = AlarmService::new(
            SchedulerConfig::foreground(),
            AlarmSettings::default(),
            clock.clone(),
            audio,
            notifier.clone(),
        )
        .unwrap();
        let id = service
            .add_alarm(
                at(8, 0, 0),
                "Wake",
                AlarmOptions {
                    sound: Some("rooster".to_string()),
                    ..AlarmOptions::default()
                },
            )
            .unwrap();
        service.start().unwrap();

        clock.advance(Duration::from_secs(5));
        service.poll();
        settle().await;
        assert!(!service.is_any_ringing());

        clock.advance(Duration::from_secs(10));
        service.poll();
        settle().await;

        assert!(service.get_alarm(id).unwrap().is_ringing);
        assert_eq!(service.audio().current_sound(), Some("rooster"));
        assert!(wake_lock.is_held());
        assert_eq!(notifier.shown_count(), 1);

        assert!(service.stop_alarm(id));
        settle().await;

        assert!(!service.is_audio_playing());
        assert_eq!(backend.live_count(), 0);
        assert!(!wake_lock.is_held());
        assert_eq!(notifier.closed().len(), 1);

        service.shutdown();
    }
}

//! Synthesized alarm audio.
//!
//! The engine renders catalog sounds procedurally and loops them until
//! stopped. Every voice it starts belongs to a *session* (one synthesis
//! pass), and every session is torn down by exactly one of:
//!
//! - an explicit [`AudioEngine::stop`]
//! - its own cleanup timer, one grace period after the pass ends
//! - the periodic sweep, once it is older than the maximum session age
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   start_voice   ┌──────────────────┐
//! │   AudioEngine    │────────────────▶│   AudioBackend   │
//! │  sessions/token  │                 │ (rodio or mock)  │
//! └────────┬─────────┘                 └──────────────────┘
//!          │ acquire/release
//!          ▼
//! ┌──────────────────┐
//! │     WakeLock     │
//! └──────────────────┘
//! ```
//!
//! Each `play` takes a new playback token; `stop` invalidates it. Loop
//! iterations, preview auto-stops and a `play` that was still opening the
//! backend all check the token before touching the output.

mod backend;
mod catalog;
mod config;
mod error;
mod rodio_backend;
mod synth;
mod wakelock;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub use backend::{AudioBackend, BackendFactory, MockAudioBackend, VoiceHandle};
pub use catalog::{
    find_sound, is_known_sound, sound_name, Effect, Envelope, SoundDefinition, Waveform,
    DEFAULT_SOUND, SOUNDS,
};
pub use config::AudioConfig;
pub use error::{AudioError, WakeLockError};
pub use rodio_backend::RodioBackend;
pub use synth::{voices_for, MasterGain, Modulation, Voice, VoiceSource, VoiceSpec, SAMPLE_RATE};
pub use wakelock::{CommandWakeLock, MockWakeLock, WakeLock};

/// Default length of a sound preview.
pub const DEFAULT_TEST_DURATION: Duration = Duration::from_millis(3000);

struct Session {
    voices: Vec<Box<dyn VoiceHandle>>,
    cleanup: Option<JoinHandle<()>>,
    created_at: Instant,
}

impl Session {
    fn release(self) {
        if let Some(cleanup) = self.cleanup {
            cleanup.abort();
        }
        stop_voices(self.voices);
    }
}

fn stop_voices(voices: Vec<Box<dyn VoiceHandle>>) {
    for voice in voices {
        if let Err(e) = voice.stop() {
            debug!("Ignoring voice stop error: {}", e);
        }
    }
}

#[derive(Default)]
struct EngineState {
    backend: Option<Arc<dyn AudioBackend>>,
    playing: bool,
    token: u64,
    current_sound: Option<&'static str>,
    loop_task: Option<JoinHandle<()>>,
    sweep_task: Option<JoinHandle<()>>,
    sessions: HashMap<u64, Session>,
    next_session_id: u64,
    disposed: bool,
}

struct Inner {
    config: AudioConfig,
    factory: BackendFactory,
    wake_lock: Arc<dyn WakeLock>,
    gain: MasterGain,
    state: Mutex<EngineState>,
}

/// Looping synthesizer for alarm sounds.
pub struct AudioEngine {
    inner: Arc<Inner>,
}

impl AudioEngine {
    /// Creates an engine. The backend is opened on first `play`.
    #[must_use]
    pub fn new(config: AudioConfig, factory: BackendFactory, wake_lock: Arc<dyn WakeLock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                gain: MasterGain::new(config.volume),
                config,
                factory,
                wake_lock,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Creates an engine on the default output device.
    #[must_use]
    pub fn with_rodio(config: AudioConfig) -> Self {
        Self::new(
            config,
            RodioBackend::factory(),
            Arc::new(CommandWakeLock::new()),
        )
    }

    /// Starts looping `sound_id` until [`stop`](Self::stop).
    ///
    /// Replaces whatever is currently playing.
    ///
    /// # Errors
    ///
    /// - `AudioError::UnknownSound` if `sound_id` is not in the catalog
    /// - `AudioError::Unavailable` if the output cannot be opened or resumed
    /// - `AudioError::Disposed` after [`dispose`](Self::dispose)
    pub async fn play(&self, sound_id: &str) -> Result<(), AudioError> {
        self.start_playback(sound_id).await.map(|_| ())
    }

    /// Plays `sound_id` and stops after `duration`, unless something else
    /// has been played or stopped in the meantime.
    ///
    /// # Errors
    ///
    /// Same as [`play`](Self::play).
    pub async fn test_sound(&self, sound_id: &str, duration: Duration) -> Result<(), AudioError> {
        let Some(token) = self.start_playback(sound_id).await? else {
            return Ok(());
        };

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(inner) = weak.upgrade() {
                if inner.is_current(token) {
                    debug!("Sound preview finished");
                    inner.stop();
                }
            }
        });
        Ok(())
    }

    /// Stops playback, tears down every session and releases the wake-lock.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Sets the master volume, clamped to `[0, 1]`. Takes effect on sounds
    /// already playing.
    pub fn set_volume(&self, volume: f32) {
        let stored = self.inner.gain.set(volume);
        debug!("Volume set to {:.2}", stored);
    }

    #[must_use]
    pub fn get_volume(&self) -> f32 {
        self.inner.gain.get()
    }

    #[must_use]
    pub fn is_currently_playing(&self) -> bool {
        self.inner.lock_state().playing
    }

    /// Key of the sound currently looping.
    #[must_use]
    pub fn current_sound(&self) -> Option<&'static str> {
        self.inner.lock_state().current_sound
    }

    #[must_use]
    pub fn get_all_sounds(&self) -> &'static [SoundDefinition] {
        &SOUNDS
    }

    #[must_use]
    pub fn get_sound_name<'a>(&self, sound_id: &'a str) -> &'a str {
        sound_name(sound_id)
    }

    #[must_use]
    pub fn active_session_count(&self) -> usize {
        self.inner.lock_state().sessions.len()
    }

    #[must_use]
    pub fn tracked_voice_count(&self) -> usize {
        self.inner
            .lock_state()
            .sessions
            .values()
            .map(|s| s.voices.len())
            .sum()
    }

    /// Stops, ends the sweep and closes the backend. Safe to call repeatedly.
    pub fn dispose(&self) {
        self.inner.stop();

        let (sweep, backend) = {
            let mut state = self.inner.lock_state();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (state.sweep_task.take(), state.backend.take())
        };

        if let Some(sweep) = sweep {
            sweep.abort();
        }
        if let Some(backend) = backend {
            backend.close();
        }
        debug!("Audio engine disposed");
    }

    async fn start_playback(&self, sound_id: &str) -> Result<Option<u64>, AudioError> {
        let sound =
            find_sound(sound_id).ok_or_else(|| AudioError::UnknownSound(sound_id.to_string()))?;

        if self.is_currently_playing() {
            self.inner.stop();
        }

        let (token, backend) = {
            let mut state = self.inner.lock_state();
            if state.disposed {
                return Err(AudioError::Disposed);
            }
            state.token += 1;
            state.playing = true;
            state.current_sound = Some(sound.key);
            (state.token, state.backend.clone())
        };

        let backend = match backend {
            Some(backend) => backend,
            None => match self.inner.open_backend().await {
                Ok(backend) => backend,
                Err(e) => {
                    self.inner.rollback(token);
                    return Err(e);
                }
            },
        };

        if let Err(e) = backend.resume() {
            self.inner.rollback(token);
            return Err(e);
        }

        let backend = {
            let mut state = self.inner.lock_state();
            if state.disposed {
                drop(state);
                backend.close();
                return Ok(None);
            }
            let backend = match &state.backend {
                Some(existing) => Arc::clone(existing),
                None => {
                    state.backend = Some(Arc::clone(&backend));
                    backend
                }
            };
            if state.token != token {
                debug!("Playback superseded while opening output");
                return Ok(None);
            }
            backend
        };

        if self.inner.config.wake_lock {
            if let Err(e) = self.inner.wake_lock.acquire() {
                warn!("Wake-lock unavailable: {}", e);
            }
        }

        self.inner.synthesize_pass(token, sound, &backend);

        let weak = Arc::downgrade(&self.inner);
        let period = sound.duration();
        let loop_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.is_current(token) {
                    break;
                }
                inner.synthesize_pass(token, sound, &backend);
            }
        });

        {
            let mut state = self.inner.lock_state();
            if state.token == token && state.playing {
                state.loop_task = Some(loop_task);
            } else {
                loop_task.abort();
            }
        }

        self.inner.ensure_sweep();
        debug!(sound = sound.key, "Playback started");
        Ok(Some(token))
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("playing", &self.is_currently_playing())
            .field("volume", &self.get_volume())
            .field("sessions", &self.active_session_count())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, token: u64) -> bool {
        let state = self.lock_state();
        state.playing && state.token == token
    }

    async fn open_backend(&self) -> Result<Arc<dyn AudioBackend>, AudioError> {
        let factory = Arc::clone(&self.factory);
        tokio::task::spawn_blocking(move || factory())
            .await
            .map_err(|e| AudioError::Unavailable(e.to_string()))?
    }

    fn rollback(&self, token: u64) {
        let mut state = self.lock_state();
        if state.token == token {
            state.playing = false;
            state.current_sound = None;
        }
    }

    fn stop(&self) {
        let (loop_task, sessions) = {
            let mut state = self.lock_state();
            state.playing = false;
            state.token += 1;
            state.current_sound = None;
            let sessions: Vec<Session> = state.sessions.drain().map(|(_, s)| s).collect();
            (state.loop_task.take(), sessions)
        };

        if let Some(task) = loop_task {
            task.abort();
        }
        for session in sessions {
            session.release();
        }
        self.wake_lock.release();
    }

    fn synthesize_pass(
        self: &Arc<Self>,
        token: u64,
        sound: &'static SoundDefinition,
        backend: &Arc<dyn AudioBackend>,
    ) {
        let mut voices = Vec::new();
        for spec in voices_for(sound) {
            match backend.start_voice(spec, self.gain.clone()) {
                Ok(voice) => voices.push(voice),
                Err(e) => warn!(sound = sound.key, "Failed to start voice: {}", e),
            }
        }

        let mut state = self.lock_state();
        if !state.playing || state.token != token {
            drop(state);
            stop_voices(voices);
            return;
        }

        let id = state.next_session_id;
        state.next_session_id += 1;

        let weak = Arc::downgrade(self);
        let lifetime = sound.duration() + self.config.cleanup_grace();
        let cleanup = tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_session(id);
            }
        });

        state.sessions.insert(
            id,
            Session {
                voices,
                cleanup: Some(cleanup),
                created_at: Instant::now(),
            },
        );
    }

    fn finish_session(&self, id: u64) {
        let session = self.lock_state().sessions.remove(&id);
        if let Some(mut session) = session {
            // Called from the cleanup task itself.
            session.cleanup = None;
            session.release();
        }
    }

    fn ensure_sweep(self: &Arc<Self>) {
        let mut state = self.lock_state();
        if state.sweep_task.is_some() || state.disposed {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval();
        let max_age = self.config.max_session_age();
        state.sweep_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.sweep(max_age);
            }
        }));
    }

    fn sweep(&self, max_age: Duration) {
        let stale: Vec<Session> = {
            let mut state = self.lock_state();
            let ids: Vec<u64> = state
                .sessions
                .iter()
                .filter(|(_, s)| s.created_at.elapsed() > max_age)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| state.sessions.remove(id))
                .collect()
        };

        if !stale.is_empty() {
            debug!("Sweeping {} stale audio session(s)", stale.len());
        }
        for session in stale {
            session.release();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

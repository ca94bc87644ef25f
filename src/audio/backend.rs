//! Audio output abstraction.
//!
//! The engine talks to an [`AudioBackend`] and holds a [`VoiceHandle`] for
//! every voice it starts. Stopping consumes the handle, so a voice cannot be
//! stopped twice.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::error::AudioError;
use super::synth::{MasterGain, VoiceSpec};

/// A started voice.
pub trait VoiceHandle: Send {
    /// Stops the voice immediately.
    ///
    /// # Errors
    ///
    /// May return `AudioError::AlreadyStopped` if the voice had finished on
    /// its own; callers treat that as benign.
    fn stop(self: Box<Self>) -> Result<(), AudioError>;
}

/// Audio output device.
pub trait AudioBackend: Send + Sync {
    /// Makes the output ready to play.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Unavailable` if the output cannot be used.
    fn resume(&self) -> Result<(), AudioError>;

    /// Starts rendering `spec` immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the voice cannot be attached to the output.
    fn start_voice(
        &self,
        spec: VoiceSpec,
        gain: MasterGain,
    ) -> Result<Box<dyn VoiceHandle>, AudioError>;

    /// Releases the output device. Further voices fail to start.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Creates backends on demand. Called off the async threads.
pub type BackendFactory =
    Arc<dyn Fn() -> Result<Arc<dyn AudioBackend>, AudioError> + Send + Sync + 'static>;

/// Mock audio backend for testing.
///
/// Records every started voice and counts how many are still live.
#[derive(Debug, Default)]
pub struct MockAudioBackend {
    started: Mutex<Vec<VoiceSpec>>,
    live: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    resume_fails: AtomicBool,
    closed: AtomicBool,
}

impl MockAudioBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a factory that always hands out this backend.
    #[must_use]
    pub fn factory(self: &Arc<Self>) -> BackendFactory {
        let backend = Arc::clone(self);
        Arc::new(move || Ok(Arc::clone(&backend) as Arc<dyn AudioBackend>))
    }

    /// Returns a factory that always fails to open a device.
    #[must_use]
    pub fn unavailable_factory() -> BackendFactory {
        Arc::new(|| Err(AudioError::Unavailable("mock device missing".to_string())))
    }

    pub fn set_resume_fails(&self, fails: bool) {
        self.resume_fails.store(fails, Ordering::SeqCst);
    }

    #[must_use]
    pub fn started_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    #[must_use]
    pub fn started_voices(&self) -> Vec<VoiceSpec> {
        self.started.lock().unwrap().clone()
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stopped_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl AudioBackend for MockAudioBackend {
    fn resume(&self) -> Result<(), AudioError> {
        if self.resume_fails.load(Ordering::SeqCst) {
            return Err(AudioError::Unavailable("mock resume failure".to_string()));
        }
        if self.is_closed() {
            return Err(AudioError::Unavailable("mock backend closed".to_string()));
        }
        Ok(())
    }

    fn start_voice(
        &self,
        spec: VoiceSpec,
        _gain: MasterGain,
    ) -> Result<Box<dyn VoiceHandle>, AudioError> {
        if self.is_closed() {
            return Err(AudioError::Backend("mock backend closed".to_string()));
        }
        self.started.lock().unwrap().push(spec);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockVoice {
            live: Arc::clone(&self.live),
            stopped: Arc::clone(&self.stopped),
        }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockVoice {
    live: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

impl VoiceHandle for MockVoice {
    fn stop(self: Box<Self>) -> Result<(), AudioError> {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

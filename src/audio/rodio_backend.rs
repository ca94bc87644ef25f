//! Audio backend using rodio.
//!
//! rodio's `OutputStream` must stay on the thread that opened it, so a
//! dedicated `audio-output` thread owns it for the backend's lifetime and
//! hands the (thread-safe) stream handle back to the caller. Each voice plays
//! on its own `Sink`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, warn};

use super::backend::{AudioBackend, BackendFactory, VoiceHandle};
use super::error::AudioError;
use super::synth::{MasterGain, Voice, VoiceSpec};

/// Audio backend playing voices on the default output device.
pub struct RodioBackend {
    handle: OutputStreamHandle,
    shutdown: Mutex<Option<Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RodioBackend {
    /// Opens the default output device.
    ///
    /// Blocks until the output thread reports whether the device opened.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Unavailable` if there is no output device or the
    /// output thread cannot be started.
    pub fn open() -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    if ready_tx.send(Ok(handle)).is_err() {
                        return;
                    }
                    // Returns on shutdown or when the backend is dropped.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    debug!("Audio output stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::Unavailable(e.to_string())));
                }
            })
            .map_err(|e| AudioError::Unavailable(e.to_string()))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| AudioError::Unavailable("audio output thread exited".to_string()))??;

        debug!("Audio output stream initialized");

        Ok(Self {
            handle,
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
            closed: AtomicBool::new(false),
        })
    }

    /// Factory suitable for [`AudioEngine::new`](super::AudioEngine::new).
    #[must_use]
    pub fn factory() -> BackendFactory {
        Arc::new(|| Ok(Arc::new(Self::open()?) as Arc<dyn AudioBackend>))
    }
}

impl AudioBackend for RodioBackend {
    fn resume(&self) -> Result<(), AudioError> {
        if self.is_closed() {
            return Err(AudioError::Unavailable(
                "audio output has been closed".to_string(),
            ));
        }
        Ok(())
    }

    fn start_voice(
        &self,
        spec: VoiceSpec,
        gain: MasterGain,
    ) -> Result<Box<dyn VoiceHandle>, AudioError> {
        if self.is_closed() {
            return Err(AudioError::Backend("audio output has been closed".to_string()));
        }

        let sink = Sink::try_new(&self.handle).map_err(|e| AudioError::Backend(e.to_string()))?;
        sink.append(Voice::new(spec, gain));

        Ok(Box::new(RodioVoice { sink }))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(());
        }
        if let Some(thread) = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            if thread.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RodioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioBackend")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

struct RodioVoice {
    sink: Sink,
}

impl VoiceHandle for RodioVoice {
    fn stop(self: Box<Self>) -> Result<(), AudioError> {
        if self.sink.empty() {
            return Err(AudioError::AlreadyStopped);
        }
        self.sink.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::catalog::find_sound;
    use crate::audio::synth::voices_for;

    #[test]
    fn test_open_graceful_failure() {
        // Containers usually have no output device; either outcome is fine.
        match RodioBackend::open() {
            Ok(backend) => {
                assert!(backend.resume().is_ok());
                let spec = voices_for(find_sound("beep").unwrap()).remove(0);
                let voice = backend.start_voice(spec, MasterGain::new(0.0)).unwrap();
                let _ = voice.stop();
                backend.close();
                assert!(backend.is_closed());
                assert!(backend.resume().is_err());
            }
            Err(e) => assert!(e.is_device_error()),
        }
    }

    #[test]
    fn test_factory_graceful_failure() {
        let factory = RodioBackend::factory();
        if let Ok(backend) = factory() {
            backend.close();
        }
    }
}

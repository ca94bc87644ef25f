//! Keeping the display awake while an alarm sounds.
//!
//! [`CommandWakeLock`] holds an inhibitor process for as long as the lock is
//! held: `caffeinate -d` on macOS, `systemd-inhibit` on Linux. Other
//! platforms report [`WakeLockError::Unsupported`].

use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::error::WakeLockError;

/// A single, re-acquirable wake-lock.
pub trait WakeLock: Send + Sync {
    /// Acquires the lock, releasing any lock already held first.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no wake-lock or it cannot be taken.
    fn acquire(&self) -> Result<(), WakeLockError>;

    /// Releases the lock if held.
    fn release(&self);

    fn is_held(&self) -> bool;
}

/// Wake-lock backed by an inhibitor child process.
#[derive(Debug, Default)]
pub struct CommandWakeLock {
    child: Mutex<Option<Child>>,
}

impl CommandWakeLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn inhibitor_command() -> Option<Command> {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("caffeinate");
            cmd.arg("-d");
            Some(cmd)
        } else if cfg!(target_os = "linux") {
            let mut cmd = Command::new("systemd-inhibit");
            cmd.args([
                "--what=idle:sleep",
                "--who=alarm-clock",
                "--why=Alarm is ringing",
                "--mode=block",
                "sleep",
                "infinity",
            ]);
            Some(cmd)
        } else {
            None
        }
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WakeLock for CommandWakeLock {
    fn acquire(&self) -> Result<(), WakeLockError> {
        self.release();

        let mut cmd = Self::inhibitor_command().ok_or(WakeLockError::Unsupported)?;
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| WakeLockError::AcquireFailed(e.to_string()))?;

        debug!(pid = child.id(), "Wake-lock acquired");
        *self.lock_child() = Some(child);
        Ok(())
    }

    fn release(&self) {
        if let Some(mut child) = self.lock_child().take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Wake-lock released");
        }
    }

    fn is_held(&self) -> bool {
        self.lock_child().is_some()
    }
}

impl Drop for CommandWakeLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Mock wake-lock for testing.
#[derive(Debug, Default)]
pub struct MockWakeLock {
    held: AtomicBool,
    acquire_calls: AtomicUsize,
    release_calls: AtomicUsize,
    should_fail: AtomicBool,
}

impl MockWakeLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn acquire_count(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn release_count(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }
}

impl WakeLock for MockWakeLock {
    fn acquire(&self) -> Result<(), WakeLockError> {
        self.release();
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(WakeLockError::AcquireFailed("mock failure".to_string()));
        }
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            self.release_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

//! Time sources for the scheduler and the alarm engine.
//!
//! Two notions of time are used:
//! - wall-clock local time (`NaiveDateTime`) for alarm matching
//! - monotonic milliseconds for scheduler cadence and drift
//!
//! `SystemClock` reads the real clocks; `ManualClock` is advanced by hand so
//! tests can step through minutes without sleeping.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};

/// Source of wall-clock and monotonic time.
pub trait Clock: Send + Sync + 'static {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Monotonic milliseconds since an arbitrary, fixed origin.
    fn monotonic_ms(&self) -> i64;
}

/// Clock backed by `chrono::Local` and `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn monotonic_ms(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Advancing moves both the wall clock and the monotonic counter; `set`
/// jumps the wall clock only, the way a system time change would.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug, Clone, Copy)]
struct ManualState {
    wall: NaiveDateTime,
    monotonic_ms: i64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            state: Mutex::new(ManualState {
                wall: start,
                monotonic_ms: 0,
            }),
        }
    }

    /// Moves time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        state.wall += delta;
        state.monotonic_ms += i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
    }

    /// Sets the wall clock to `wall` without touching the monotonic counter.
    pub fn set(&self, wall: NaiveDateTime) {
        self.lock().wall = wall;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.lock().wall
    }

    fn monotonic_ms(&self) -> i64 {
        self.lock().monotonic_ms
    }
}

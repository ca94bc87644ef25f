//! Drift-corrected precision scheduler.
//!
//! The scheduler fans one tick stream out to any number of named
//! subscriptions, each with its own interval.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  TickMessage   ┌──────────────────┐
//! │   tick-worker    │───────────────▶│  consumer task   │──▶ subscriptions
//! │ (OS thread)      │                │  (tokio)         │
//! └──────────────────┘                └──────────────────┘
//!                                       ▲
//!                                       │ fallback when the worker is
//!                                       │ unavailable or dies
//!                                     foreground loop (tokio sleep)
//! ```
//!
//! Both drivers share [`DriftTracker`] for cadence and [`PrecisionScheduler::poll`]
//! for fan-out, so the public contract does not depend on which one runs.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use alarm_clock::clock::SystemClock;
//! use alarm_clock::scheduler::{PrecisionScheduler, SchedulerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = PrecisionScheduler::new(SchedulerConfig::default(), Arc::new(SystemClock::new()))?;
//! scheduler.add_timer("clock-face", Duration::from_secs(1), || {
//!     println!("tick");
//!     Ok(())
//! });
//! scheduler.start()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod drift;
mod error;
mod worker;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::clock::Clock;

pub use config::SchedulerConfig;
pub use drift::DriftTracker;
pub use error::SchedulerError;
pub use worker::{TickMessage, TickWorker};

/// Callback invoked when a subscription is due.
///
/// Returning `Err` (or panicking) is logged and does not affect other
/// subscriptions.
pub type TimerCallback = Box<dyn FnMut() -> anyhow::Result<()> + Send + 'static>;

/// Where interval timing currently runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Background worker thread.
    Worker,
    /// Tokio task on the consumer side.
    Foreground,
}

/// Snapshot of scheduler health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub is_running: bool,
    pub active_timers: usize,
    pub total_timers: usize,
    pub drift_ms: i64,
    pub using_worker: bool,
    pub ticks: u64,
    pub corrections: u64,
    pub config: SchedulerConfig,
}

struct Subscription {
    interval_ms: i64,
    last_execution_ms: i64,
    enabled: bool,
    callback: Arc<Mutex<TimerCallback>>,
}

struct SchedulerState {
    subscriptions: HashMap<String, Subscription>,
    running: bool,
    disposed: bool,
    mode: ExecutionMode,
    worker_failed: bool,
    drift_ms: i64,
    ticks: u64,
    corrections: u64,
}

struct Shared {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState>,
}

struct Driver {
    task: JoinHandle<()>,
    worker: Option<TickWorker>,
}

/// Drift-corrected periodic scheduler with named subscriptions.
pub struct PrecisionScheduler {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl PrecisionScheduler {
    /// Creates a stopped scheduler.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if `config` does not validate.
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self, SchedulerError> {
        config.validate()?;

        let mode = if config.use_worker {
            ExecutionMode::Worker
        } else {
            ExecutionMode::Foreground
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                clock,
                state: Mutex::new(SchedulerState {
                    subscriptions: HashMap::new(),
                    running: false,
                    disposed: false,
                    mode,
                    worker_failed: false,
                    drift_ms: 0,
                    ticks: 0,
                    corrections: 0,
                }),
            }),
            driver: Mutex::new(None),
        })
    }

    /// Registers (or replaces) the subscription `id`.
    ///
    /// The first firing happens one `interval` after registration.
    pub fn add_timer<F>(&self, id: impl Into<String>, interval: Duration, callback: F)
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let id = id.into();
        let now = self.shared.clock.monotonic_ms();
        let callback: TimerCallback = Box::new(callback);

        let mut state = self.shared.lock_state();
        state.subscriptions.insert(
            id.clone(),
            Subscription {
                interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
                last_execution_ms: now,
                enabled: true,
                callback: Arc::new(Mutex::new(callback)),
            },
        );
        debug!(timer = %id, "Timer added ({:?})", interval);
    }

    /// Removes the subscription `id`. Unknown ids are ignored.
    pub fn remove_timer(&self, id: &str) {
        if self.shared.lock_state().subscriptions.remove(id).is_some() {
            debug!(timer = %id, "Timer removed");
        }
    }

    /// Re-enables `id`, measuring its next firing from now.
    pub fn enable_timer(&self, id: &str) {
        let now = self.shared.clock.monotonic_ms();
        if let Some(sub) = self.shared.lock_state().subscriptions.get_mut(id) {
            sub.enabled = true;
            sub.last_execution_ms = now;
        }
    }

    /// Skips `id` on future ticks without forgetting it.
    pub fn disable_timer(&self, id: &str) {
        if let Some(sub) = self.shared.lock_state().subscriptions.get_mut(id) {
            sub.enabled = false;
        }
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn has_timer(&self, id: &str) -> bool {
        self.shared.lock_state().subscriptions.contains_key(id)
    }

    /// Starts ticking.
    ///
    /// Prefers the background worker; falls back to the foreground loop if
    /// the worker is disabled, previously failed, or cannot be spawned.
    /// Calling `start` while running does nothing.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NoRuntime` outside a tokio runtime and
    /// `SchedulerError::Disposed` after [`dispose`](Self::dispose).
    pub fn start(&self) -> Result<(), SchedulerError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let mut driver = self.lock_driver();

        let try_worker = {
            let mut state = self.shared.lock_state();
            if state.disposed {
                return Err(SchedulerError::Disposed);
            }
            if state.running {
                return Ok(());
            }
            state.running = true;
            self.shared.config.use_worker && !state.worker_failed
        };

        let (worker, ticks) = if try_worker {
            let (tx, rx) = mpsc::unbounded_channel();
            match TickWorker::spawn(
                self.shared.config.target_interval_ms,
                self.shared.config.correction_threshold_ms,
                tx,
            ) {
                Ok(worker) => (Some(worker), Some(rx)),
                Err(e) => {
                    warn!("{}; using foreground loop", e);
                    self.shared.mark_worker_failed();
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        self.shared.lock_state().mode = if worker.is_some() {
            ExecutionMode::Worker
        } else {
            ExecutionMode::Foreground
        };

        let shared = Arc::clone(&self.shared);
        let task = runtime.spawn(async move { shared.drive(ticks).await });
        *driver = Some(Driver { task, worker });

        debug!("Scheduler started");
        Ok(())
    }

    /// Stops ticking. Subscriptions are kept.
    pub fn stop(&self) {
        let driver = self.lock_driver().take();
        self.shared.lock_state().running = false;

        if let Some(driver) = driver {
            driver.task.abort();
            if let Some(worker) = driver.worker {
                worker.stop();
            }
            debug!("Scheduler stopped");
        }
    }

    /// Marks every enabled subscription as due immediately.
    ///
    /// Used after the host regains focus so any backlog from throttling is
    /// cleared on the next tick.
    pub fn force_sync(&self) {
        let now = self.shared.clock.monotonic_ms();
        let mut state = self.shared.lock_state();
        for sub in state.subscriptions.values_mut().filter(|s| s.enabled) {
            sub.last_execution_ms = now - sub.interval_ms;
        }
    }

    /// Runs one evaluation of all subscriptions against the scheduler clock.
    pub fn poll(&self) {
        self.shared.dispatch();
    }

    #[must_use]
    pub fn get_stats(&self) -> SchedulerStats {
        let state = self.shared.lock_state();
        SchedulerStats {
            is_running: state.running,
            active_timers: state.subscriptions.values().filter(|s| s.enabled).count(),
            total_timers: state.subscriptions.len(),
            drift_ms: state.drift_ms,
            using_worker: state.mode == ExecutionMode::Worker && !state.worker_failed,
            ticks: state.ticks,
            corrections: state.corrections,
            config: self.shared.config,
        }
    }

    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        self.shared.lock_state().mode
    }

    /// Stops, forgets all subscriptions and refuses future starts.
    ///
    /// Safe to call more than once.
    pub fn dispose(&self) {
        self.stop();
        let mut state = self.shared.lock_state();
        state.subscriptions.clear();
        state.disposed = true;
    }

    /// Drops the worker handle without stopping the scheduler, as if the
    /// worker thread had died.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn simulate_worker_failure(&self) {
        if let Some(driver) = self.lock_driver().as_mut() {
            drop(driver.worker.take());
        }
    }

    fn lock_driver(&self) -> MutexGuard<'_, Option<Driver>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PrecisionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PrecisionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.get_stats();
        f.debug_struct("PrecisionScheduler")
            .field("is_running", &stats.is_running)
            .field("total_timers", &stats.total_timers)
            .field("using_worker", &stats.using_worker)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.lock_state().running
    }

    fn mark_worker_failed(&self) {
        let mut state = self.lock_state();
        state.worker_failed = true;
        state.mode = ExecutionMode::Foreground;
    }

    fn record_tick(&self, drift_ms: i64, corrections: u64) {
        let mut state = self.lock_state();
        state.drift_ms = drift_ms;
        state.corrections = corrections;
        state.ticks += 1;
    }

    async fn drive(&self, ticks: Option<UnboundedReceiver<TickMessage>>) {
        if let Some(mut ticks) = ticks {
            while let Some(tick) = ticks.recv().await {
                self.record_tick(tick.drift_ms, tick.corrections);
                self.dispatch();
            }

            if !self.is_running() {
                return;
            }
            warn!("Tick worker stopped unexpectedly; falling back to foreground loop");
            self.mark_worker_failed();
        }

        self.run_foreground().await;
    }

    async fn run_foreground(&self) {
        let mut tracker = DriftTracker::new(
            self.config.target_interval_ms,
            self.config.correction_threshold_ms,
            self.clock.monotonic_ms(),
        );
        let base_corrections = self.lock_state().corrections;

        loop {
            let delay = tracker.next_delay_ms(self.clock.monotonic_ms());
            tokio::time::sleep(Duration::from_millis(delay.max(1))).await;

            if !self.is_running() {
                return;
            }

            let drift = tracker.record_tick(self.clock.monotonic_ms());
            self.record_tick(drift, base_corrections + tracker.corrections());
            self.dispatch();
        }
    }

    fn dispatch(&self) {
        let now = self.clock.monotonic_ms();
        let max_drift = i64::try_from(self.config.max_drift_ms).unwrap_or(0);

        let due: Vec<(String, Arc<Mutex<TimerCallback>>)> = {
            let state = self.lock_state();
            if state.disposed {
                return;
            }
            state
                .subscriptions
                .iter()
                .filter(|(_, sub)| {
                    sub.enabled && now - sub.last_execution_ms >= sub.interval_ms - max_drift
                })
                .map(|(id, sub)| (id.clone(), Arc::clone(&sub.callback)))
                .collect()
        };

        for (id, callback) in due {
            let mut guard = match callback.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    debug!(timer = %id, "Timer still running, skipping this tick");
                    continue;
                }
            };

            match panic::catch_unwind(AssertUnwindSafe(|| (*guard)())) {
                Ok(Ok(())) => {
                    if let Some(sub) = self.lock_state().subscriptions.get_mut(&id) {
                        sub.last_execution_ms = now;
                    }
                }
                Ok(Err(e)) => error!(timer = %id, "Timer callback failed: {:#}", e),
                Err(payload) => error!(
                    timer = %id,
                    "Timer callback panicked: {}",
                    panic_message(payload.as_ref())
                ),
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

// ============================================================================
// Tests
// ============================================================================

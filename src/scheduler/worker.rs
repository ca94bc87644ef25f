//! Background tick worker.
//!
//! The worker is an isolated thread that owns its own `DriftTracker` and
//! only talks to the scheduler through channels: commands come in over a
//! crossbeam channel, ticks go out over a tokio channel to the consumer task
//! that runs the callbacks.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::drift::DriftTracker;
use super::error::SchedulerError;

/// A tick posted by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickMessage {
    /// Milliseconds since the worker started.
    pub elapsed_ms: i64,
    /// Drift of this tick against its nominal deadline.
    pub drift_ms: i64,
    /// Number of baseline corrections so far.
    pub corrections: u64,
}

#[derive(Debug)]
enum WorkerCommand {
    Stop,
}

/// Handle to a running tick worker thread.
///
/// Dropping the handle without calling [`TickWorker::stop`] disconnects the
/// control channel; the thread notices and exits on its next wake-up.
#[derive(Debug)]
pub struct TickWorker {
    control: Sender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl TickWorker {
    /// Spawns the worker thread.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WorkerSpawn` if the OS refuses the thread.
    pub fn spawn(
        interval_ms: u64,
        correction_threshold_ms: u64,
        ticks: UnboundedSender<TickMessage>,
    ) -> Result<Self, SchedulerError> {
        let (control, commands) = bounded(1);

        let thread = thread::Builder::new()
            .name("tick-worker".to_string())
            .spawn(move || run(commands, ticks, interval_ms, correction_threshold_ms))
            .map_err(|e| SchedulerError::WorkerSpawn(e.to_string()))?;

        debug!("Tick worker started ({} ms)", interval_ms);

        Ok(Self {
            control,
            thread: Some(thread),
        })
    }

    /// Stops the worker and waits for its thread to finish.
    pub fn stop(mut self) {
        let _ = self.control.send(WorkerCommand::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        debug!("Tick worker stopped");
    }
}

fn run(
    commands: Receiver<WorkerCommand>,
    ticks: UnboundedSender<TickMessage>,
    interval_ms: u64,
    correction_threshold_ms: u64,
) {
    let origin = Instant::now();
    let now_ms = || i64::try_from(origin.elapsed().as_millis()).unwrap_or(i64::MAX);
    let mut tracker = DriftTracker::new(interval_ms, correction_threshold_ms, now_ms());

    loop {
        let delay = Duration::from_millis(tracker.next_delay_ms(now_ms()));

        match commands.recv_timeout(delay) {
            Ok(WorkerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let now = now_ms();
                let drift_ms = tracker.record_tick(now);
                let message = TickMessage {
                    elapsed_ms: now,
                    drift_ms,
                    corrections: tracker.corrections(),
                };
                if ticks.send(message).is_err() {
                    // Consumer is gone.
                    break;
                }
            }
        }
    }
}

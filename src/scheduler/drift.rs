//! Drift tracking shared by the worker thread and the foreground loop.
//!
//! The tracker keeps a baseline timestamp and the number of ticks since that
//! baseline. Ticks are scheduled against nominal deadlines
//! (`baseline + n * interval`) so small lateness does not accumulate; drift
//! beyond the correction threshold re-bases the tracker instead.

/// Drift-corrected tick bookkeeping.
#[derive(Debug, Clone)]
pub struct DriftTracker {
    interval_ms: i64,
    threshold_ms: i64,
    baseline_ms: i64,
    ticks_since_baseline: i64,
    total_ticks: u64,
    corrections: u64,
    last_drift_ms: i64,
}

impl DriftTracker {
    /// Creates a tracker whose baseline is `now_ms`.
    #[must_use]
    pub fn new(interval_ms: u64, threshold_ms: u64, now_ms: i64) -> Self {
        Self {
            interval_ms: i64::try_from(interval_ms.max(1)).unwrap_or(i64::MAX),
            threshold_ms: i64::try_from(threshold_ms).unwrap_or(i64::MAX),
            baseline_ms: now_ms,
            ticks_since_baseline: 0,
            total_ticks: 0,
            corrections: 0,
            last_drift_ms: 0,
        }
    }

    /// Records a tick observed at `now_ms` and returns its drift.
    ///
    /// Drift is `elapsed - ticks * interval`. When its magnitude exceeds the
    /// threshold the baseline moves to `now_ms`.
    pub fn record_tick(&mut self, now_ms: i64) -> i64 {
        self.ticks_since_baseline += 1;
        self.total_ticks += 1;

        let elapsed = now_ms - self.baseline_ms;
        let drift = elapsed - self.ticks_since_baseline * self.interval_ms;
        self.last_drift_ms = drift;

        if drift.abs() > self.threshold_ms {
            self.baseline_ms = now_ms;
            self.ticks_since_baseline = 0;
            self.corrections += 1;
        }

        drift
    }

    /// Milliseconds to wait from `now_ms` until the next nominal deadline.
    #[must_use]
    pub fn next_delay_ms(&self, now_ms: i64) -> u64 {
        let deadline = self.baseline_ms + (self.ticks_since_baseline + 1) * self.interval_ms;
        u64::try_from((deadline - now_ms).max(0)).unwrap_or(0)
    }

    #[must_use]
    pub fn last_drift_ms(&self) -> i64 {
        self.last_drift_ms
    }

    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    #[must_use]
    pub fn corrections(&self) -> u64 {
        self.corrections
    }
}

use std::time::Duration;

use loadgate_metrics::{RateStats, rate_between};

use super::table::Totals;

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_requests: u64,
    pub completed: u64,
    pub successful: u64,
    pub failed: u64,
    pub workers_done: u32,
    pub workers_total: u32,

    /// Completions/sec observed during the last progress interval.
    pub rps_now: f64,
    /// Mean and max of `rps_now` across intervals so far.
    pub rps_avg: f64,
    pub rps_max: f64,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Turns successive totals into [`ProgressUpdate`]s with per-interval rates.
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    tick: u64,
    prev_elapsed: Duration,
    prev_completed: u64,
    rps: RateStats,
}

impl ProgressTracker {
    pub(crate) fn update(
        &mut self,
        elapsed: Duration,
        totals: Totals,
        total_requests: u64,
        workers_done: u32,
        workers_total: u32,
    ) -> ProgressUpdate {
        self.tick += 1;

        let rps_now = rate_between(
            self.prev_completed,
            totals.completed,
            elapsed.saturating_sub(self.prev_elapsed),
        );
        self.rps.push(rps_now);
        self.prev_elapsed = elapsed;
        self.prev_completed = totals.completed;

        ProgressUpdate {
            tick: self.tick,
            elapsed,
            total_requests,
            completed: totals.completed,
            successful: totals.successful,
            failed: totals.failed,
            workers_done,
            workers_total,
            rps_now,
            rps_avg: self.rps.mean(),
            rps_max: self.rps.max(),
        }
    }
}

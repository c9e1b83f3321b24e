use loadgate_metrics::LatencyHistogram;

use crate::ipc::{FailureCounts, ProgressSnapshot, StatusClass, TerminalReport};

use super::RequestOutcome;

/// Running counters of one worker. Owned and mutated by the dispatch loop only.
#[derive(Debug, Clone)]
pub struct WorkerCounters {
    worker_id: u32,
    completed: u64,
    successful: u64,
    cumulative_duration_micros: u64,
    min_duration_micros: Option<u64>,
    max_duration_micros: Option<u64>,
    failures: FailureCounts,
    latency: LatencyHistogram,
}

impl WorkerCounters {
    pub fn new(worker_id: u32) -> Self {
        Self {
            worker_id,
            completed: 0,
            successful: 0,
            cumulative_duration_micros: 0,
            min_duration_micros: None,
            max_duration_micros: None,
            failures: FailureCounts::default(),
            latency: LatencyHistogram::default(),
        }
    }

    /// The status class decides success, so `successful + failures.total() == Some(completed)` holds.
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.record_class(outcome.status_class, outcome.duration_micros);
    }

    pub(crate) fn record_class(&mut self, class: StatusClass, duration_micros: u64) {
        self.completed += 1;
        if class.is_success() {
            self.successful += 1;
        } else {
            self.failures.record(class);
        }

        self.cumulative_duration_micros = self
            .cumulative_duration_micros
            .saturating_add(duration_micros);
        self.min_duration_micros = Some(
            self.min_duration_micros
                .map_or(duration_micros, |m| m.min(duration_micros)),
        );
        self.max_duration_micros = Some(
            self.max_duration_micros
                .map_or(duration_micros, |m| m.max(duration_micros)),
        );
        self.latency.record_micros(duration_micros);
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            worker_id: self.worker_id,
            completed: self.completed,
            successful: self.successful,
            cumulative_duration_micros: self.cumulative_duration_micros,
            min_duration_micros: self.min_duration_micros,
            max_duration_micros: self.max_duration_micros,
            failures: self.failures,
        }
    }

    pub fn terminal_report(&self, max_in_flight: u32) -> TerminalReport {
        TerminalReport {
            snapshot: self.snapshot(),
            latency: self.latency.to_buckets(),
            max_in_flight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_partition_completed() {
        let mut c = WorkerCounters::new(2);
        c.record_class(StatusClass::Ok, 1_000);
        c.record_class(StatusClass::Ok, 3_000);
        c.record_class(StatusClass::ServerError, 2_000);
        c.record_class(StatusClass::Timeout, 5_000);

        let s = c.snapshot();
        assert_eq!(s.worker_id, 2);
        assert_eq!(s.completed, 4);
        assert_eq!(s.successful, 2);
        assert_eq!(s.failures.total(), Some(s.failed()));
        assert_eq!(s.failures.server_error, 1);
        assert_eq!(s.failures.timeout, 1);
        assert_eq!(s.cumulative_duration_micros, 11_000);
        assert_eq!(s.min_duration_micros, Some(1_000));
        assert_eq!(s.max_duration_micros, Some(5_000));
    }

    #[test]
    fn terminal_report_carries_every_latency_sample() {
        let mut c = WorkerCounters::new(0);
        for micros in [100, 200, 200, 900] {
            c.record_class(StatusClass::Ok, micros);
        }
        let report = c.terminal_report(3);
        assert_eq!(report.latency.total_count(), 4);
        assert_eq!(report.max_in_flight, 3);
        assert_eq!(report.snapshot, c.snapshot());
    }
}

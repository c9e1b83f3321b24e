use std::collections::BTreeMap;
use std::time::Duration;

use loadgate_metrics::LatencyHistogram;

use crate::ipc::{FailureCounts, ProgressSnapshot, TerminalReport};
use crate::metrics::{AggregateMetrics, WorkerOutcome, WorkerSummary};

use super::WorkerAssignment;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("unknown worker {0}")]
    UnknownWorker(u32),

    #[error("worker {0} already sent its terminal report")]
    AfterTerminal(u32),

    #[error("completed ({completed}) exceeds the assignment ({assigned})")]
    ExceedsAssignment { completed: u64, assigned: u64 },

    #[error("successful ({successful}) exceeds completed ({completed})")]
    SuccessfulExceedsCompleted { successful: u64, completed: u64 },

    #[error("`{0}` went backwards")]
    Regressed(&'static str),

    #[error("failure classes sum to {sum}, expected {expected}")]
    FailureMismatch { sum: u64, expected: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitState {
    Running,
    Exited { code: Option<i32> },
    /// Killed by the escalation path, or given up on.
    Escalated,
}

#[derive(Debug)]
struct WorkerRow {
    assignment: WorkerAssignment,
    latest: ProgressSnapshot,
    histogram: Option<LatencyHistogram>,
    max_in_flight: Option<u32>,
    terminal: bool,
    fatal: Option<String>,
    exit: ExitState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub completed: u64,
    pub successful: u64,
    pub failed: u64,
}

/// The latest accepted snapshot of every worker.
#[derive(Debug, Default)]
pub struct SnapshotTable {
    rows: BTreeMap<u32, WorkerRow>,
}

impl SnapshotTable {
    pub fn new(assignments: &[WorkerAssignment]) -> Self {
        let rows = assignments
            .iter()
            .map(|a| {
                (
                    a.worker_id,
                    WorkerRow {
                        assignment: a.clone(),
                        latest: ProgressSnapshot::empty(a.worker_id),
                        histogram: None,
                        max_in_flight: None,
                        terminal: false,
                        fatal: None,
                        exit: ExitState::Running,
                    },
                )
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Validates `snapshot` against the worker's previous one and stores it.
    pub fn apply(&mut self, snapshot: ProgressSnapshot) -> Result<(), Rejection> {
        let row = self
            .rows
            .get_mut(&snapshot.worker_id)
            .ok_or(Rejection::UnknownWorker(snapshot.worker_id))?;
        if row.terminal {
            return Err(Rejection::AfterTerminal(snapshot.worker_id));
        }
        check_snapshot(&row.assignment, &row.latest, &snapshot)?;
        row.latest = snapshot;
        Ok(())
    }

    /// Applies the terminal snapshot and keeps the histogram when it matches the counters.
    pub fn apply_terminal(&mut self, report: TerminalReport) -> Result<(), Rejection> {
        let worker_id = report.snapshot.worker_id;
        self.apply(report.snapshot)?;

        let Some(row) = self.rows.get_mut(&worker_id) else {
            return Err(Rejection::UnknownWorker(worker_id));
        };
        row.terminal = true;
        row.max_in_flight = Some(report.max_in_flight);

        if report.latency.total_count() != row.latest.completed {
            tracing::warn!(
                worker_id,
                buckets = report.latency.total_count(),
                completed = row.latest.completed,
                "latency histogram does not match the reported count; ignoring it"
            );
            return Ok(());
        }
        match LatencyHistogram::from_buckets(&report.latency) {
            Ok(h) => row.histogram = Some(h),
            Err(err) => tracing::warn!(worker_id, "ignoring latency histogram: {err}"),
        }
        Ok(())
    }

    pub fn mark_fatal(&mut self, worker_id: u32, message: String) {
        if let Some(row) = self.rows.get_mut(&worker_id) {
            row.fatal = Some(message);
        }
    }

    pub(crate) fn mark_exit(&mut self, worker_id: u32, exit: ExitState) {
        if let Some(row) = self.rows.get_mut(&worker_id)
            && row.exit == ExitState::Running
        {
            row.exit = exit;
        }
    }

    pub fn has_terminal(&self, worker_id: u32) -> bool {
        self.rows.get(&worker_id).is_some_and(|r| r.terminal)
    }

    pub fn latest(&self, worker_id: u32) -> Option<&ProgressSnapshot> {
        self.rows.get(&worker_id).map(|r| &r.latest)
    }

    /// Running totals: the sum of every worker's latest accepted snapshot.
    pub fn totals(&self) -> Totals {
        self.rows.values().fold(Totals::default(), |mut acc, row| {
            acc.completed += row.latest.completed;
            acc.successful += row.latest.successful;
            acc.failed += row.latest.failed();
            acc
        })
    }

    /// Builds the final run metrics. Quota a worker never reported counts as failed.
    pub fn freeze(&self, wall_clock: Duration) -> AggregateMetrics {
        let mut reported_completed = 0u64;
        let mut successful = 0u64;
        let mut unreported = 0u64;
        let mut cumulative = 0u64;
        let mut min: Option<u64> = None;
        let mut max: Option<u64> = None;
        let mut failures = FailureCounts::default();
        let mut merged = LatencyHistogram::default();
        let mut all_histograms = !self.rows.is_empty();
        let mut workers = Vec::with_capacity(self.rows.len());

        for row in self.rows.values() {
            let s = &row.latest;
            reported_completed += s.completed;
            successful += s.successful;
            cumulative = cumulative.saturating_add(s.cumulative_duration_micros);
            failures.add(&s.failures);
            min = match (min, s.min_duration_micros) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            max = match (max, s.max_duration_micros) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };

            let shortfall = row.assignment.requests_to_process.saturating_sub(s.completed);
            unreported += shortfall;

            match &row.histogram {
                Some(h) if all_histograms => {
                    if let Err(err) = merged.merge(h) {
                        tracing::warn!(
                            worker_id = row.assignment.worker_id,
                            "dropping the merged latency summary: {err}"
                        );
                        all_histograms = false;
                    }
                }
                Some(_) => {}
                None => all_histograms = false,
            }

            workers.push(WorkerSummary {
                worker_id: row.assignment.worker_id,
                assigned: row.assignment.requests_to_process,
                completed: s.completed,
                successful: s.successful,
                outcome: row.outcome(shortfall),
                max_in_flight: row.max_in_flight,
                exit_code: match row.exit {
                    ExitState::Exited { code } => code,
                    ExitState::Running | ExitState::Escalated => None,
                },
            });
        }

        let total_completed = reported_completed + unreported;
        AggregateMetrics {
            total_completed,
            total_successful: successful,
            total_failed: total_completed - successful,
            unreported,
            cumulative_duration_micros: cumulative,
            min_duration_micros: min,
            max_duration_micros: max,
            wall_clock,
            failures,
            latency: all_histograms.then(|| merged.summary()),
            workers,
        }
    }
}

impl WorkerRow {
    fn outcome(&self, shortfall: u64) -> WorkerOutcome {
        if self.fatal.is_some() {
            WorkerOutcome::Fatal
        } else if self.terminal {
            if shortfall == 0 {
                WorkerOutcome::Completed
            } else {
                WorkerOutcome::Stopped
            }
        } else if self.exit == ExitState::Escalated {
            WorkerOutcome::Unresponsive
        } else {
            WorkerOutcome::Crashed
        }
    }
}

fn check_snapshot(
    assignment: &WorkerAssignment,
    prev: &ProgressSnapshot,
    next: &ProgressSnapshot,
) -> Result<(), Rejection> {
    if next.completed > assignment.requests_to_process {
        return Err(Rejection::ExceedsAssignment {
            completed: next.completed,
            assigned: assignment.requests_to_process,
        });
    }
    if next.successful > next.completed {
        return Err(Rejection::SuccessfulExceedsCompleted {
            successful: next.successful,
            completed: next.completed,
        });
    }
    if next.completed < prev.completed {
        return Err(Rejection::Regressed("completed"));
    }
    if next.successful < prev.successful {
        return Err(Rejection::Regressed("successful"));
    }
    if next.cumulative_duration_micros < prev.cumulative_duration_micros {
        return Err(Rejection::Regressed("cumulative_duration_micros"));
    }
    if !next.failures.dominates(&prev.failures) {
        return Err(Rejection::Regressed("failures"));
    }
    match next.failures.total() {
        Some(sum) if sum == next.failed() => Ok(()),
        sum => Err(Rejection::FailureMismatch {
            sum: sum.unwrap_or(u64::MAX),
            expected: next.failed(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use loadgate_metrics::LatencyBuckets;

    use super::*;
    use crate::aggregator::partition;

    fn snap(worker_id: u32, completed: u64, successful: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            worker_id,
            completed,
            successful,
            cumulative_duration_micros: completed * 1_000,
            min_duration_micros: (completed > 0).then_some(1_000),
            max_duration_micros: (completed > 0).then_some(1_000),
            failures: FailureCounts {
                server_error: completed - successful,
                ..FailureCounts::default()
            },
        }
    }

    fn terminal(worker_id: u32, completed: u64, successful: u64) -> TerminalReport {
        TerminalReport {
            snapshot: snap(worker_id, completed, successful),
            latency: LatencyBuckets(if completed > 0 {
                vec![(1_000, completed)]
            } else {
                Vec::new()
            }),
            max_in_flight: 2,
        }
    }

    #[test]
    fn totals_sum_latest_rows() {
        let mut t = SnapshotTable::new(&partition(100, 2, 1));
        t.apply(snap(0, 10, 9)).unwrap_or_else(|e| panic!("{e}"));
        t.apply(snap(0, 20, 18)).unwrap_or_else(|e| panic!("{e}"));
        t.apply(snap(1, 5, 5)).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(
            t.totals(),
            Totals {
                completed: 25,
                successful: 23,
                failed: 2
            }
        );
    }

    #[test]
    fn rejects_invalid_snapshots() {
        let mut t = SnapshotTable::new(&partition(100, 2, 1));
        t.apply(snap(0, 20, 20)).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(t.apply(snap(9, 1, 1)), Err(Rejection::UnknownWorker(9)));
        assert_eq!(t.apply(snap(0, 10, 10)), Err(Rejection::Regressed("completed")));
        assert!(matches!(
            t.apply(snap(0, 51, 51)),
            Err(Rejection::ExceedsAssignment { .. })
        ));

        let mut bad = snap(0, 30, 20);
        bad.successful = 31;
        assert!(matches!(
            t.apply(bad),
            Err(Rejection::SuccessfulExceedsCompleted { .. })
        ));

        let mut mismatch = snap(0, 30, 20);
        mismatch.failures.server_error = 3;
        assert!(matches!(
            t.apply(mismatch),
            Err(Rejection::FailureMismatch { sum: 3, expected: 10 })
        ));

        let mut slower = snap(0, 30, 30);
        slower.cumulative_duration_micros = 1;
        assert_eq!(
            t.apply(slower),
            Err(Rejection::Regressed("cumulative_duration_micros"))
        );

        let mut overflowing = snap(0, 30, 30);
        overflowing.failures.client_error = u64::MAX;
        overflowing.failures.server_error = 1;
        assert!(matches!(
            t.apply(overflowing),
            Err(Rejection::FailureMismatch { expected: 0, .. })
        ));

        // Rejected snapshots leave the row untouched.
        assert_eq!(t.latest(0).map(|s| s.completed), Some(20));
    }

    #[test]
    fn nothing_is_accepted_after_terminal() {
        let mut t = SnapshotTable::new(&partition(10, 1, 1));
        t.apply_terminal(terminal(0, 10, 10))
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(t.has_terminal(0));
        assert_eq!(t.apply(snap(0, 10, 10)), Err(Rejection::AfterTerminal(0)));
    }

    #[test]
    fn freeze_counts_unreported_quota_as_failed() {
        let mut t = SnapshotTable::new(&partition(1000, 4, 50));
        for id in [0, 1, 3] {
            t.apply_terminal(terminal(id, 250, 250))
                .unwrap_or_else(|e| panic!("{e}"));
        }
        t.apply(snap(2, 100, 100)).unwrap_or_else(|e| panic!("{e}"));
        t.mark_exit(2, ExitState::Exited { code: Some(1) });

        let m = t.freeze(Duration::from_secs(1));
        assert_eq!(m.total_completed, 1000);
        assert_eq!(m.total_successful, 850);
        assert_eq!(m.total_failed, 150);
        assert_eq!(m.unreported, 150);
        assert_eq!(m.total_successful + m.total_failed, m.total_completed);
        assert!(m.latency.is_none());

        let crashed = &m.workers[2];
        assert_eq!(crashed.outcome, WorkerOutcome::Crashed);
        assert_eq!(crashed.completed, 100);
        assert_eq!(crashed.exit_code, Some(1));
        assert_eq!(m.workers[0].outcome, WorkerOutcome::Completed);
        assert_eq!(m.workers[0].max_in_flight, Some(2));
    }

    #[test]
    fn freeze_merges_histograms_when_all_present() {
        let mut t = SnapshotTable::new(&partition(20, 2, 1));
        t.apply_terminal(terminal(0, 10, 10))
            .unwrap_or_else(|e| panic!("{e}"));
        t.apply_terminal(terminal(1, 10, 8))
            .unwrap_or_else(|e| panic!("{e}"));

        let m = t.freeze(Duration::from_secs(2));
        assert_eq!(m.unreported, 0);
        assert_eq!(m.total_failed, 2);
        assert_eq!(m.failures.server_error, 2);
        assert_eq!(m.failures.client_error, 0);
        let latency = m.latency.unwrap_or_else(|| panic!("expected histogram"));
        assert_eq!(latency.count, 20);
    }

    #[test]
    fn mismatched_histogram_is_dropped() {
        let mut t = SnapshotTable::new(&partition(10, 1, 1));
        let mut report = terminal(0, 10, 10);
        report.latency = LatencyBuckets(vec![(1_000, 3)]);
        t.apply_terminal(report).unwrap_or_else(|e| panic!("{e}"));
        assert!(t.freeze(Duration::from_secs(1)).latency.is_none());
    }

    #[test]
    fn outcomes_reflect_how_workers_ended() {
        let mut t = SnapshotTable::new(&partition(30, 3, 1));
        t.apply_terminal(terminal(0, 4, 4))
            .unwrap_or_else(|e| panic!("{e}"));
        t.mark_exit(1, ExitState::Escalated);
        t.mark_fatal(2, "boom".to_string());

        let m = t.freeze(Duration::from_secs(1));
        let outcomes: Vec<WorkerOutcome> = m.workers.iter().map(|w| w.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                WorkerOutcome::Stopped,
                WorkerOutcome::Unresponsive,
                WorkerOutcome::Fatal
            ]
        );
        assert_eq!(m.unreported, 6 + 10 + 10);
    }
}

//! Run-over-run comparison of derived metrics.
//!
//! A [`HistoricalRun`] is the persisted form of a finished run. [`compare`] diffs the current
//! run against the latest one of the same profile and raises advisory flags; it never affects
//! the compliance verdict.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::DerivedMetrics;

mod store;

pub use store::BaselineStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRun {
    pub timestamp: DateTime<Utc>,
    pub profile: String,
    pub metrics: DerivedMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegressionStatus {
    NoBaseline,
    Compared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub status: RegressionStatus,
    pub baseline_timestamp: Option<DateTime<Utc>>,
    /// Percent change per metric name.
    pub metric_deltas: BTreeMap<String, f64>,
    pub regression_flags: Vec<String>,
    pub notes: Vec<String>,
}

impl RegressionReport {
    pub fn has_regressions(&self) -> bool {
        !self.regression_flags.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionPolicy {
    pub latency_increase_percent: f64,
    pub throughput_drop_percent: f64,
    pub error_rate_increase_percent: f64,
}

impl Default for RegressionPolicy {
    fn default() -> Self {
        Self {
            latency_increase_percent: 10.0,
            throughput_drop_percent: 10.0,
            error_rate_increase_percent: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Higher is worse.
    Increase,
    /// Lower is worse.
    Drop,
}

struct Compared {
    name: &'static str,
    direction: Direction,
    limit: f64,
    /// Any rise from a zero baseline counts as a regression.
    flag_from_zero: bool,
}

/// `None` when the previous value is zero and the current one is not.
pub fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return (current == 0.0).then_some(0.0);
    }
    Some((current - previous) / previous * 100.0)
}

pub fn compare(
    current: &DerivedMetrics,
    baseline: Option<&HistoricalRun>,
    policy: &RegressionPolicy,
) -> RegressionReport {
    let Some(baseline) = baseline else {
        return RegressionReport {
            status: RegressionStatus::NoBaseline,
            baseline_timestamp: None,
            metric_deltas: BTreeMap::new(),
            regression_flags: Vec::new(),
            notes: vec![
                "no baseline found for this profile; this run becomes the first baseline"
                    .to_string(),
            ],
        };
    };
    let previous = &baseline.metrics;

    let pairs = [
        (
            Compared {
                name: "p95_latency_ms",
                direction: Direction::Increase,
                limit: policy.latency_increase_percent,
                flag_from_zero: false,
            },
            current.p95_latency_ms.zip(previous.p95_latency_ms),
        ),
        (
            Compared {
                name: "avg_latency_ms",
                direction: Direction::Increase,
                limit: policy.latency_increase_percent,
                flag_from_zero: false,
            },
            current.avg_latency_ms.zip(previous.avg_latency_ms),
        ),
        (
            Compared {
                name: "error_rate_percent",
                direction: Direction::Increase,
                limit: policy.error_rate_increase_percent,
                flag_from_zero: true,
            },
            Some((current.error_rate_percent, previous.error_rate_percent)),
        ),
        (
            Compared {
                name: "throughput_rps",
                direction: Direction::Drop,
                limit: policy.throughput_drop_percent,
                flag_from_zero: false,
            },
            Some((current.throughput_rps, previous.throughput_rps)),
        ),
    ];

    let mut metric_deltas = BTreeMap::new();
    let mut regression_flags = Vec::new();
    let mut notes = Vec::new();

    for (metric, values) in pairs {
        let Some((now, before)) = values else {
            notes.push(format!("{} missing in one of the runs; not compared", metric.name));
            continue;
        };
        match percent_change(now, before) {
            Some(delta) => {
                metric_deltas.insert(metric.name.to_string(), delta);
                let regressed = match metric.direction {
                    Direction::Increase => delta > metric.limit,
                    Direction::Drop => delta < -metric.limit,
                };
                if regressed {
                    regression_flags.push(metric.name.to_string());
                    notes.push(format!(
                        "{} {} by {:.1}% (limit {}%): {before:.3} -> {now:.3}",
                        metric.name,
                        match metric.direction {
                            Direction::Increase => "increased",
                            Direction::Drop => "dropped",
                        },
                        delta.abs(),
                        metric.limit,
                    ));
                }
            }
            None => {
                notes.push(format!(
                    "{} rose from 0 to {now:.3}; percent change is undefined",
                    metric.name
                ));
                if metric.flag_from_zero {
                    regression_flags.push(metric.name.to_string());
                }
            }
        }
    }

    if current.latency_source != previous.latency_source {
        notes.push(
            "latency percentiles come from different sources in the two runs (histogram vs average fallback)"
                .to_string(),
        );
    }

    RegressionReport {
        status: RegressionStatus::Compared,
        baseline_timestamp: Some(baseline.timestamp),
        metric_deltas,
        regression_flags,
        notes,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::metrics::LatencySource;

    pub(crate) fn derived(p95: f64, avg: f64, error_rate: f64, rps: f64) -> DerivedMetrics {
        DerivedMetrics {
            total_requests: 1000,
            error_rate_percent: error_rate,
            availability_percent: 100.0 - error_rate,
            throughput_rps: rps,
            avg_latency_ms: Some(avg),
            min_latency_ms: Some(1.0),
            max_latency_ms: Some(p95 * 2.0),
            p50_latency_ms: Some(avg),
            p95_latency_ms: Some(p95),
            p99_latency_ms: Some(p95 * 1.5),
            latency_source: LatencySource::Histogram,
        }
    }

    pub(crate) fn run_at(secs: i64, profile: &str, metrics: DerivedMetrics) -> HistoricalRun {
        HistoricalRun {
            timestamp: Utc
                .timestamp_opt(1_700_000_000 + secs, 0)
                .single()
                .unwrap_or_else(|| panic!("valid timestamp")),
            profile: profile.to_string(),
            metrics,
        }
    }

    #[test]
    fn no_baseline_is_informational() {
        let report = compare(
            &derived(100.0, 50.0, 1.0, 200.0),
            None,
            &RegressionPolicy::default(),
        );
        assert_eq!(report.status, RegressionStatus::NoBaseline);
        assert!(report.metric_deltas.is_empty());
        assert!(!report.has_regressions());
        assert_eq!(report.notes.len(), 1);
    }

    #[test]
    fn identical_metrics_are_a_no_op() {
        let m = derived(100.0, 50.0, 1.0, 200.0);
        let baseline = run_at(0, "baseline", m.clone());
        let report = compare(&m, Some(&baseline), &RegressionPolicy::default());

        assert_eq!(report.status, RegressionStatus::Compared);
        assert_eq!(report.baseline_timestamp, Some(baseline.timestamp));
        assert_eq!(report.metric_deltas.len(), 4);
        assert!(report.metric_deltas.values().all(|d| *d == 0.0));
        assert!(report.regression_flags.is_empty());
    }

    #[test]
    fn flags_latency_error_and_throughput_regressions() {
        let baseline = run_at(0, "stress", derived(100.0, 50.0, 2.0, 200.0));
        let current = derived(120.0, 52.0, 4.0, 150.0);
        let report = compare(&current, Some(&baseline), &RegressionPolicy::default());

        assert!((report.metric_deltas["p95_latency_ms"] - 20.0).abs() < 1e-9);
        assert!((report.metric_deltas["avg_latency_ms"] - 4.0).abs() < 1e-9);
        assert!((report.metric_deltas["error_rate_percent"] - 100.0).abs() < 1e-9);
        assert!((report.metric_deltas["throughput_rps"] + 25.0).abs() < 1e-9);

        assert_eq!(
            report.regression_flags,
            vec!["p95_latency_ms", "error_rate_percent", "throughput_rps"]
        );
        assert!(
            report
                .notes
                .iter()
                .any(|n| n == "throughput_rps dropped by 25.0% (limit 10%): 200.000 -> 150.000"),
            "{:?}",
            report.notes
        );
    }

    #[test]
    fn improvements_are_not_flagged() {
        let baseline = run_at(0, "x", derived(100.0, 50.0, 2.0, 200.0));
        let current = derived(50.0, 25.0, 0.0, 400.0);
        let report = compare(&current, Some(&baseline), &RegressionPolicy::default());
        assert!(report.regression_flags.is_empty());
    }

    #[test]
    fn errors_appearing_from_zero_are_flagged_without_a_delta() {
        let baseline = run_at(0, "x", derived(100.0, 50.0, 0.0, 200.0));
        let current = derived(100.0, 50.0, 0.5, 200.0);
        let report = compare(&current, Some(&baseline), &RegressionPolicy::default());

        assert!(!report.metric_deltas.contains_key("error_rate_percent"));
        assert_eq!(report.regression_flags.len(), 1);
        assert_eq!(report.regression_flags, vec!["error_rate_percent"]);
        assert!(report.notes.iter().any(|n| n.contains("undefined")));
    }

    #[test]
    fn missing_p95_is_skipped() {
        let mut previous = derived(100.0, 50.0, 1.0, 200.0);
        previous.p95_latency_ms = None;
        let baseline = run_at(0, "x", previous);
        let report = compare(
            &derived(500.0, 50.0, 1.0, 200.0),
            Some(&baseline),
            &RegressionPolicy::default(),
        );
        assert!(!report.metric_deltas.contains_key("p95_latency_ms"));
        assert!(report.regression_flags.is_empty());
    }

    #[test]
    fn percent_change_edges() {
        assert_eq!(percent_change(0.0, 0.0), Some(0.0));
        assert_eq!(percent_change(1.0, 0.0), None);
        assert_eq!(percent_change(150.0, 100.0), Some(50.0));
    }
}

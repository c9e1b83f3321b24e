use std::time::Duration;

use loadgate_metrics::HistogramSummary;
use serde::{Deserialize, Serialize};

use crate::ipc::FailureCounts;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkerOutcome {
    /// Finished its whole assignment and reported it.
    Completed,
    /// Sent a terminal report before finishing its assignment (stop request).
    Stopped,
    /// Exited without a terminal report.
    Crashed,
    /// Reported a fatal error.
    Fatal,
    /// Had to be killed or abandoned after the run timeout.
    Unresponsive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker_id: u32,
    pub assigned: u64,
    pub completed: u64,
    pub successful: u64,
    pub outcome: WorkerOutcome,
    pub max_in_flight: Option<u32>,
    pub exit_code: Option<i32>,
}

/// Frozen, run-wide totals.
///
/// `unreported` is quota that no worker ever reported (crash or timeout). It is part of both
/// `total_completed` and `total_failed`, so `total_completed` always equals the request budget
/// and `total_successful + total_failed == total_completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_completed: u64,
    pub total_successful: u64,
    pub total_failed: u64,
    pub unreported: u64,
    pub cumulative_duration_micros: u64,
    pub min_duration_micros: Option<u64>,
    pub max_duration_micros: Option<u64>,
    #[serde(rename = "wall_clock_ms", with = "duration_ms")]
    pub wall_clock: Duration,
    pub failures: FailureCounts,
    /// Present only when every worker delivered its latency histogram.
    pub latency: Option<HistogramSummary>,
    pub workers: Vec<WorkerSummary>,
}

impl AggregateMetrics {
    /// Requests whose outcome a worker actually reported.
    pub fn reported(&self) -> u64 {
        self.total_completed.saturating_sub(self.unreported)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LatencySource {
    Histogram,
    /// Percentiles were unavailable and carry the average latency instead.
    AverageFallback,
}

/// The metric values SLOs and baselines are expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub total_requests: u64,
    pub error_rate_percent: f64,
    pub availability_percent: f64,
    pub throughput_rps: f64,
    pub avg_latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub latency_source: LatencySource,
}

fn micros_to_ms(micros: f64) -> f64 {
    micros / 1_000.0
}

impl DerivedMetrics {
    pub fn from_aggregate(m: &AggregateMetrics) -> Self {
        let error_rate_percent = if m.total_completed == 0 {
            0.0
        } else {
            m.total_failed as f64 / m.total_completed as f64 * 100.0
        };

        let wall_secs = m.wall_clock.as_secs_f64();
        let throughput_rps = if wall_secs > 0.0 {
            m.total_completed as f64 / wall_secs
        } else {
            0.0
        };

        // Requests that never reported carry no duration.
        let reported = m.reported();
        let avg_latency_ms = (reported > 0)
            .then(|| micros_to_ms(m.cumulative_duration_micros as f64 / reported as f64));

        let (p50, p95, p99, latency_source) = match &m.latency {
            Some(h) => (
                h.p50.map(micros_to_ms),
                h.p95.map(micros_to_ms),
                h.p99.map(micros_to_ms),
                LatencySource::Histogram,
            ),
            None => (
                avg_latency_ms,
                avg_latency_ms,
                avg_latency_ms,
                LatencySource::AverageFallback,
            ),
        };

        Self {
            total_requests: m.total_completed,
            error_rate_percent,
            availability_percent: 100.0 - error_rate_percent,
            throughput_rps,
            avg_latency_ms,
            min_latency_ms: m.min_duration_micros.map(|v| micros_to_ms(v as f64)),
            max_latency_ms: m.max_duration_micros.map(|v| micros_to_ms(v as f64)),
            p50_latency_ms: p50,
            p95_latency_ms: p95,
            p99_latency_ms: p99,
            latency_source,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Duration::try_from_secs_f64(ms / 1_000.0).map_err(|err| {
            serde::de::Error::custom(format_args!("invalid wall_clock_ms {ms}: {err}"))
        })
    }
}

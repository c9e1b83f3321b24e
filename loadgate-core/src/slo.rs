use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metrics::{AggregateMetrics, DerivedMetrics, LatencySource};

pub const DEFAULT_PASS_THRESHOLD_PERCENT: f64 = 95.0;

const LATENCY_RECOMMENDATION: &str =
    "Latency objectives missed: add caching for hot read paths and optimize slow database queries.";
const AVAILABILITY_RECOMMENDATION: &str =
    "Error-rate objectives missed: review error handling, timeouts and retry behaviour of the failing endpoints.";
const THROUGHPUT_RECOMMENDATION: &str =
    "Throughput objectives missed: scale the service horizontally or raise its connection and worker pool limits.";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SloMetric {
    AvgLatencyMs,
    P50LatencyMs,
    P95LatencyMs,
    P99LatencyMs,
    MaxLatencyMs,
    ErrorRatePercent,
    AvailabilityPercent,
    ThroughputRps,
}

/// Recommendation buckets, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SloCategory {
    Latency,
    Availability,
    Throughput,
}

impl SloMetric {
    pub fn category(self) -> SloCategory {
        match self {
            Self::AvgLatencyMs
            | Self::P50LatencyMs
            | Self::P95LatencyMs
            | Self::P99LatencyMs
            | Self::MaxLatencyMs => SloCategory::Latency,
            Self::ErrorRatePercent | Self::AvailabilityPercent => SloCategory::Availability,
            Self::ThroughputRps => SloCategory::Throughput,
        }
    }

    pub fn is_percentile(self) -> bool {
        matches!(
            self,
            Self::P50LatencyMs | Self::P95LatencyMs | Self::P99LatencyMs
        )
    }

    pub fn default_unit(self) -> &'static str {
        match self.category() {
            SloCategory::Latency => "ms",
            SloCategory::Availability => "%",
            SloCategory::Throughput => "rps",
        }
    }

    /// Multiplier from `unit` to this metric's base unit (ms, percent, requests/sec).
    pub fn unit_factor(self, unit: &str) -> Option<f64> {
        match (self.category(), unit) {
            (SloCategory::Latency, "us" | "µs") => Some(0.001),
            (SloCategory::Latency, "ms") => Some(1.0),
            (SloCategory::Latency, "s") => Some(1_000.0),
            (SloCategory::Availability, "%" | "percent") => Some(1.0),
            (SloCategory::Throughput, "rps" | "req/s") => Some(1.0),
            _ => None,
        }
    }

    /// The observed value in the metric's base unit.
    pub fn actual(self, m: &DerivedMetrics) -> Option<f64> {
        match self {
            Self::AvgLatencyMs => m.avg_latency_ms,
            Self::P50LatencyMs => m.p50_latency_ms,
            Self::P95LatencyMs => m.p95_latency_ms,
            Self::P99LatencyMs => m.p99_latency_ms,
            Self::MaxLatencyMs => m.max_latency_ms,
            Self::ErrorRatePercent => Some(m.error_rate_percent),
            Self::AvailabilityPercent => Some(m.availability_percent),
            Self::ThroughputRps => Some(m.throughput_rps),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum ComparisonOp {
    #[serde(rename = "<=", alias = "le")]
    #[strum(to_string = "<=", serialize = "le")]
    Le,

    #[serde(rename = ">=", alias = "ge")]
    #[strum(to_string = ">=", serialize = "ge")]
    Ge,
}

impl ComparisonOp {
    pub fn holds(self, actual: f64, target: f64) -> bool {
        match self {
            Self::Le => actual <= target,
            Self::Ge => actual >= target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloThreshold {
    pub metric: SloMetric,
    pub op: ComparisonOp,
    pub target: f64,
    pub unit: String,
}

impl SloThreshold {
    pub fn new(
        metric: SloMetric,
        op: ComparisonOp,
        target: f64,
        unit: impl Into<String>,
    ) -> Result<Self> {
        let t = Self {
            metric,
            op,
            target,
            unit: unit.into(),
        };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.target.is_finite() || self.target < 0.0 {
            return Err(self.invalid("target must be a non-negative number"));
        }
        if self.metric.unit_factor(&self.unit).is_none() {
            return Err(self.invalid(&format!(
                "unit `{}` does not apply (expected e.g. `{}`)",
                self.unit,
                self.metric.default_unit()
            )));
        }
        Ok(())
    }

    /// Parses `<metric> <op> <target>[unit]`, e.g. `p95_latency_ms <= 500ms`.
    pub fn parse(raw: &str) -> Result<Self> {
        let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let invalid = |reason: &str| Error::InvalidThreshold {
            metric: raw.to_string(),
            reason: reason.to_string(),
        };

        let (op_pos, op) = [("<=", ComparisonOp::Le), (">=", ComparisonOp::Ge)]
            .iter()
            .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, *op)))
            .ok_or_else(|| invalid("missing operator (expected `<=` or `>=`)"))?;

        let (left, right) = s.split_at(op_pos);
        let right = &right[2..];
        if left.is_empty() || right.is_empty() {
            return Err(invalid("expected `<metric> <op> <target>`"));
        }

        let metric = SloMetric::from_str(left).map_err(|_| invalid("unknown metric"))?;

        let unit_at = right
            .find(|c: char| c.is_alphabetic() || c == '%' || c == '/')
            .unwrap_or(right.len());
        let (number, unit) = right.split_at(unit_at);
        let target: f64 = number
            .parse()
            .map_err(|_| invalid("target is not a number"))?;
        let unit = if unit.is_empty() {
            metric.default_unit()
        } else {
            unit
        };

        Self::new(metric, op, target, unit)
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::InvalidThreshold {
            metric: self.metric.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for SloThreshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for SloThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}{}", self.metric, self.op, self.target, self.unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompliancePolicy {
    pub pass_threshold_percent: f64,
    /// Whether a failed report should fail the run (non-zero exit).
    pub fail_on_non_compliance: bool,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self {
            pass_threshold_percent: DEFAULT_PASS_THRESHOLD_PERCENT,
            fail_on_non_compliance: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloResult {
    pub metric: SloMetric,
    pub op: ComparisonOp,
    pub target: f64,
    /// Observed value, in the threshold's unit.
    pub actual: Option<f64>,
    pub unit: String,
    pub passed: bool,
    /// The value is the average latency standing in for a missing percentile.
    pub approximated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub timestamp: DateTime<Utc>,
    pub profile: String,
    pub overall_compliance_percent: f64,
    pub pass_threshold_percent: f64,
    pub passed: bool,
    pub results: Vec<SloResult>,
    pub recommendations: Vec<String>,
    pub notes: Vec<String>,
    pub metrics: DerivedMetrics,
}

/// Judges `metrics` against `thresholds`. Pure: the same inputs give the same report.
pub fn evaluate(
    metrics: &AggregateMetrics,
    thresholds: &[SloThreshold],
    policy: &CompliancePolicy,
    profile: &str,
    evaluated_at: DateTime<Utc>,
) -> ComplianceReport {
    let derived = DerivedMetrics::from_aggregate(metrics);
    let fallback = derived.latency_source == LatencySource::AverageFallback;

    let mut notes = Vec::new();
    let mut failed_categories: Vec<SloCategory> = Vec::new();

    let results: Vec<SloResult> = thresholds
        .iter()
        .map(|t| {
            let factor = t.metric.unit_factor(&t.unit);
            let actual = match factor {
                Some(factor) => t.metric.actual(&derived).map(|v| v / factor),
                None => {
                    notes.push(format!(
                        "threshold on `{}` uses unknown unit `{}` and counts as failed",
                        t.metric, t.unit
                    ));
                    None
                }
            };
            let passed = actual.is_some_and(|v| t.op.holds(v, t.target));
            if !passed && !failed_categories.contains(&t.metric.category()) {
                failed_categories.push(t.metric.category());
            }
            SloResult {
                metric: t.metric,
                op: t.op,
                target: t.target,
                actual,
                unit: t.unit.clone(),
                passed,
                approximated: fallback && t.metric.is_percentile(),
            }
        })
        .collect();

    let overall_compliance_percent = if results.is_empty() {
        notes.push("no SLO thresholds declared; compliance defaults to 100%".to_string());
        100.0
    } else {
        let passed = results.iter().filter(|r| r.passed).count();
        passed as f64 / results.len() as f64 * 100.0
    };

    if results.iter().any(|r| r.approximated) {
        notes.push(
            "percentile latency unavailable (not every worker delivered a histogram); \
             percentile objectives were evaluated against the average latency"
                .to_string(),
        );
    }
    if metrics.unreported > 0 {
        notes.push(format!(
            "{} requests were never reported by their workers and are counted as failed",
            metrics.unreported
        ));
    }

    failed_categories.sort();
    let recommendations = failed_categories
        .into_iter()
        .map(|c| {
            match c {
                SloCategory::Latency => LATENCY_RECOMMENDATION,
                SloCategory::Availability => AVAILABILITY_RECOMMENDATION,
                SloCategory::Throughput => THROUGHPUT_RECOMMENDATION,
            }
            .to_string()
        })
        .collect();

    ComplianceReport {
        timestamp: evaluated_at,
        profile: profile.to_string(),
        overall_compliance_percent,
        pass_threshold_percent: policy.pass_threshold_percent,
        passed: overall_compliance_percent >= policy.pass_threshold_percent,
        results,
        recommendations,
        notes,
        metrics: derived,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use loadgate_metrics::HistogramSummary;

    use super::*;
    use crate::metrics::tests::aggregate;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .single()
            .unwrap_or_else(|| panic!("valid timestamp"))
    }

    fn threshold(raw: &str) -> SloThreshold {
        SloThreshold::parse(raw).unwrap_or_else(|e| panic!("{e}"))
    }

    fn with_p95(p95_ms: f64) -> AggregateMetrics {
        let mut m = aggregate(1000, 0, Duration::from_secs(10));
        m.latency = Some(HistogramSummary {
            p50: Some(100_000.0),
            p75: Some(200_000.0),
            p90: Some(300_000.0),
            p95: Some(p95_ms * 1_000.0),
            p99: Some(p95_ms * 1_000.0),
            min: Some(5_000.0),
            max: Some(p95_ms * 1_000.0),
            mean: Some(10_000.0),
            stdev: Some(1.0),
            count: 1000,
        });
        m
    }

    #[test]
    fn parses_threshold_expressions() {
        let t = threshold(" p95_latency_ms <= 500ms ");
        assert_eq!(t.metric, SloMetric::P95LatencyMs);
        assert_eq!(t.op, ComparisonOp::Le);
        assert_eq!(t.target, 500.0);
        assert_eq!(t.unit, "ms");

        let t = threshold("availability_percent>=99.5");
        assert_eq!(t.op, ComparisonOp::Ge);
        assert_eq!(t.unit, "%");

        let t = threshold("avg_latency_ms <= 0.2s");
        assert_eq!(t.unit, "s");
        assert_eq!(t.to_string(), "avg_latency_ms <= 0.2s");
    }

    #[test]
    fn rejects_bad_expressions() {
        for raw in [
            "p95_latency_ms < 5",
            "p42_latency_ms <= 5",
            "p95_latency_ms <= fast",
            "error_rate_percent <= 5ms",
            "<= 5",
        ] {
            match SloThreshold::parse(raw) {
                Ok(t) => panic!("expected `{raw}` to be rejected, got {t:?}"),
                Err(e) => assert!(e.is_invalid_input()),
            }
        }
    }

    #[test]
    fn failing_latency_threshold_is_excluded_from_compliance() {
        let thresholds = [
            threshold("p95_latency_ms <= 500ms"),
            threshold("error_rate_percent <= 1"),
        ];
        let report = evaluate(
            &with_p95(600.0),
            &thresholds,
            &CompliancePolicy::default(),
            "baseline",
            at(),
        );

        assert!(!report.results[0].passed);
        assert_eq!(report.results[0].actual, Some(600.0));
        assert!(!report.results[0].approximated);
        assert!(report.results[1].passed);
        assert_eq!(report.overall_compliance_percent, 50.0);
        assert!(!report.passed);
        assert_eq!(report.recommendations, vec![LATENCY_RECOMMENDATION]);
    }

    #[test]
    fn all_failures_fail_availability() {
        let m = aggregate(200, 200, Duration::from_secs(2));
        let thresholds = [threshold("availability_percent >= 99")];
        let report = evaluate(&m, &thresholds, &CompliancePolicy::default(), "smoke", at());

        assert_eq!(report.metrics.error_rate_percent, 100.0);
        assert_eq!(report.metrics.availability_percent, 0.0);
        assert!(!report.results[0].passed);
        assert!(!report.passed);
        assert_eq!(report.recommendations, vec![AVAILABILITY_RECOMMENDATION]);
    }

    #[test]
    fn no_thresholds_means_full_compliance_with_a_note() {
        let report = evaluate(
            &aggregate(10, 0, Duration::from_secs(1)),
            &[],
            &CompliancePolicy::default(),
            "smoke",
            at(),
        );
        assert_eq!(report.overall_compliance_percent, 100.0);
        assert!(report.passed);
        assert!(report.notes.iter().any(|n| n.contains("no SLO thresholds")));
    }

    #[test]
    fn percentiles_fall_back_to_average_and_are_flagged() {
        let thresholds = [
            threshold("p99_latency_ms <= 50"),
            threshold("avg_latency_ms <= 50"),
        ];
        let report = evaluate(
            &aggregate(100, 0, Duration::from_secs(1)),
            &thresholds,
            &CompliancePolicy::default(),
            "smoke",
            at(),
        );

        assert_eq!(report.results[0].actual, Some(10.0));
        assert!(report.results[0].approximated);
        assert!(!report.results[1].approximated);
        assert!(report.notes.iter().any(|n| n.contains("average latency")));
    }

    #[test]
    fn units_are_converted_for_comparison_and_display() {
        let thresholds = [threshold("p95_latency_ms <= 0.5s")];
        let report = evaluate(
            &with_p95(600.0),
            &thresholds,
            &CompliancePolicy::default(),
            "x",
            at(),
        );
        assert_eq!(report.results[0].actual, Some(0.6));
        assert!(!report.results[0].passed);
    }

    #[test]
    fn recommendations_follow_category_order() {
        let m = aggregate(100, 50, Duration::from_secs(100));
        let thresholds = [
            threshold("throughput_rps >= 1000"),
            threshold("error_rate_percent <= 1"),
            threshold("max_latency_ms <= 1"),
        ];
        let report = evaluate(&m, &thresholds, &CompliancePolicy::default(), "x", at());
        assert_eq!(
            report.recommendations,
            vec![
                LATENCY_RECOMMENDATION,
                AVAILABILITY_RECOMMENDATION,
                THROUGHPUT_RECOMMENDATION
            ]
        );
        assert_eq!(report.overall_compliance_percent, 0.0);
    }

    #[test]
    fn pass_threshold_is_inclusive() {
        let thresholds = [
            threshold("error_rate_percent <= 1"),
            threshold("p95_latency_ms <= 500"),
        ];
        let policy = CompliancePolicy {
            pass_threshold_percent: 50.0,
            fail_on_non_compliance: true,
        };
        let report = evaluate(&with_p95(600.0), &thresholds, &policy, "x", at());
        assert!(report.passed);
    }

    #[test]
    fn identical_inputs_serialize_identically() {
        let thresholds = [
            threshold("p95_latency_ms <= 500"),
            threshold("throughput_rps >= 10"),
        ];
        let m = with_p95(420.0);
        let a = evaluate(&m, &thresholds, &CompliancePolicy::default(), "x", at());
        let b = evaluate(&m, &thresholds, &CompliancePolicy::default(), "x", at());
        let a = serde_json::to_string(&a).unwrap_or_else(|e| panic!("{e}"));
        let b = serde_json::to_string(&b).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(a, b);
    }

    #[test]
    fn ops_serialize_as_symbols() {
        let v = serde_json::to_value(ComparisonOp::Ge).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(v, serde_json::json!(">="));
        let op: ComparisonOp =
            serde_json::from_value(serde_json::json!("le")).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(op, ComparisonOp::Le);
        assert_eq!(ComparisonOp::Le.to_string(), "<=");
    }
}

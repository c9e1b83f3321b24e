use std::fmt::Write as _;

use loadgate_core::{AggregateMetrics, ComplianceReport, RegressionReport, RegressionStatus};

use super::duration::format_duration_single;
use super::format::{format_ms, format_percent, format_rate, format_value};
use crate::output::RunReport;

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();
    render_aggregate(&report.aggregate, &report.compliance, &mut out);
    render_compliance(&report.compliance, &mut out);
    if let Some(regression) = &report.regression {
        render_regression(regression, &mut out);
    }
    out
}

fn render_aggregate(m: &AggregateMetrics, c: &ComplianceReport, out: &mut String) {
    let d = &c.metrics;

    out.push_str("summary\n");
    writeln!(
        out,
        "  requests: {} (successful {}, failed {})",
        m.total_completed, m.total_successful, m.total_failed
    )
    .ok();
    if m.unreported > 0 {
        writeln!(out, "  unreported: {} (counted as failed)", m.unreported).ok();
    }
    if m.failures.total().is_some_and(|n| n > 0) {
        writeln!(
            out,
            "  failures: 4xx={} 5xx={} timeout={} network={}",
            m.failures.client_error,
            m.failures.server_error,
            m.failures.timeout,
            m.failures.network_error
        )
        .ok();
    }
    writeln!(
        out,
        "  error rate: {} availability: {}",
        format_percent(d.error_rate_percent),
        format_percent(d.availability_percent)
    )
    .ok();
    writeln!(
        out,
        "  throughput: rps={} wall={}",
        format_rate(d.throughput_rps),
        format_duration_single(m.wall_clock)
    )
    .ok();
    writeln!(
        out,
        "  latency = avg={} p50={} p95={} p99={} min={} max={} ({})",
        format_ms(d.avg_latency_ms),
        format_ms(d.p50_latency_ms),
        format_ms(d.p95_latency_ms),
        format_ms(d.p99_latency_ms),
        format_ms(d.min_latency_ms),
        format_ms(d.max_latency_ms),
        d.latency_source
    )
    .ok();

    out.push_str("  workers:\n");
    for w in &m.workers {
        write!(
            out,
            "    #{} {} {}/{} (successful {})",
            w.worker_id, w.outcome, w.completed, w.assigned, w.successful
        )
        .ok();
        if let Some(peak) = w.max_in_flight {
            write!(out, " in-flight<={peak}").ok();
        }
        if let Some(code) = w.exit_code {
            write!(out, " exit={code}").ok();
        }
        out.push('\n');
    }
    out.push('\n');
}

fn render_compliance(c: &ComplianceReport, out: &mut String) {
    let verdict = if c.passed { "PASS" } else { "FAIL" };
    writeln!(
        out,
        "slo compliance: {verdict} {:.1}% (required {:.1}%)",
        c.overall_compliance_percent, c.pass_threshold_percent
    )
    .ok();

    for r in &c.results {
        let mark = if r.passed { "ok  " } else { "FAIL" };
        let approx = if r.approximated { " (approx.)" } else { "" };
        writeln!(
            out,
            "  {mark} {} {} {}: actual {}{approx}",
            r.metric,
            r.op,
            format_value(Some(r.target), &r.unit),
            format_value(r.actual, &r.unit)
        )
        .ok();
    }

    if !c.recommendations.is_empty() {
        out.push_str("recommendations:\n");
        for rec in &c.recommendations {
            writeln!(out, "  - {rec}").ok();
        }
    }
    for note in &c.notes {
        writeln!(out, "note: {note}").ok();
    }
    out.push('\n');
}

fn render_regression(r: &RegressionReport, out: &mut String) {
    match (r.status, r.baseline_timestamp) {
        (RegressionStatus::Compared, Some(at)) => {
            writeln!(out, "regression: compared with baseline of {}", at.to_rfc3339()).ok();
        }
        (RegressionStatus::Compared, None) => {
            out.push_str("regression: compared with baseline\n");
        }
        (RegressionStatus::NoBaseline, _) => {
            out.push_str("regression: no baseline for this profile\n");
        }
    }

    for (metric, delta) in &r.metric_deltas {
        writeln!(out, "  {metric}: {delta:+.1}%").ok();
    }
    for flag in &r.regression_flags {
        writeln!(out, "  REGRESSION {flag}").ok();
    }
    for note in &r.notes {
        writeln!(out, "note: {note}").ok();
    }
}

use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use loadgate_core::{ProgressFn, ProgressUpdate, RunConfiguration, SloThreshold};

use super::{OutputFormatter, RunReport};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config: &RunConfiguration, _thresholds: &[SloThreshold]) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u: ProgressUpdate| {
            emit_json_line(&build_progress_line(&u));
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&JsonSummaryLine {
            kind: "summary",
            report,
        });
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,

    pub total_requests: u64,
    pub completed: u64,
    pub successful: u64,
    pub failed: u64,
    pub workers_done: u32,
    pub workers_total: u32,

    pub requests_per_sec: f64,
    pub req_per_sec_avg: f64,
    pub req_per_sec_max: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),

        total_requests: u.total_requests,
        completed: u.completed,
        successful: u.successful,
        failed: u.failed,
        workers_done: u.workers_done,
        workers_total: u.workers_total,

        requests_per_sec: u.rps_now,
        req_per_sec_avg: u.rps_avg,
        req_per_sec_max: u.rps_max,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    #[serde(flatten)]
    pub report: &'a RunReport,
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::output::tests::report;
    use serde_json::Value;

    #[test]
    fn progress_line_has_kind_and_counters() {
        let line = build_progress_line(&ProgressUpdate {
            tick: 2,
            elapsed: Duration::from_millis(2500),
            total_requests: 1000,
            completed: 400,
            successful: 390,
            failed: 10,
            workers_done: 0,
            workers_total: 4,
            rps_now: 160.0,
            rps_avg: 150.0,
            rps_max: 170.0,
        });

        let v: Value = match serde_json::to_value(&line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("elapsed_secs").and_then(Value::as_f64), Some(2.5));
        assert_eq!(v.get("completed").and_then(Value::as_u64), Some(400));
        assert_eq!(v.get("workers_total").and_then(Value::as_u64), Some(4));
    }

    #[test]
    fn summary_line_flattens_the_report() {
        let report = report(100, 20, true);
        let line = JsonSummaryLine {
            kind: "summary",
            report: &report,
        };
        let v: Value = match serde_json::to_value(&line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(
            v.pointer("/compliance/passed").and_then(Value::as_bool),
            Some(false)
        );
        assert_eq!(
            v.pointer("/compliance/results/1/metric")
                .and_then(Value::as_str),
            Some("error_rate_percent")
        );
        assert_eq!(
            v.pointer("/aggregate/total_failed").and_then(Value::as_u64),
            Some(20)
        );
        assert_eq!(
            v.pointer("/regression/status").and_then(Value::as_str),
            Some("compared")
        );
    }
}

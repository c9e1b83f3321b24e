use std::sync::Arc;

use loadgate_core::{ProgressFn, ProgressUpdate, RunConfiguration, SloThreshold};

mod duration;
mod format;
mod progress;
mod summary;

use duration::format_duration_single;
use format::format_rate;
use progress::HumanProgress;
use summary::render;

use super::{OutputFormatter, RunReport};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config: &RunConfiguration, thresholds: &[SloThreshold]) {
        println!(
            "profile: {} ({}, peak {} over {})",
            config.profile.name,
            config.profile.shape(),
            config.profile.peak_target(),
            humantime::format_duration(config.profile.total_duration())
        );
        println!("target: {}", config.target_base_url);
        let endpoints = config
            .endpoints
            .iter()
            .map(|e| format!("{}={}", e.name, e.path))
            .collect::<Vec<_>>()
            .join(" ");
        println!("endpoints: {endpoints}");
        println!(
            "requests={} workers={} concurrency={} timeout={}",
            config.total_requests,
            config.worker_count,
            config.concurrency_per_worker,
            format_duration_single(config.request_timeout)
        );
        for t in thresholds {
            println!("slo: {t}");
        }
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u: ProgressUpdate| {
            progress.update(u.completed, u.total_requests, progress_message(&u));
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        if !report.compliance.passed {
            eprintln!(
                "slo compliance failed: {:.1}% < {:.1}%",
                report.compliance.overall_compliance_percent,
                report.compliance.pass_threshold_percent
            );
        }
        if let Some(regression) = &report.regression
            && regression.has_regressions()
        {
            eprintln!("regressions against the previous baseline:");
            for flag in &regression.regression_flags {
                eprintln!("  {flag}");
            }
        }
        Ok(())
    }
}

fn progress_message(u: &ProgressUpdate) -> String {
    format!(
        "elapsed={} rps={} errors={} workers={}/{}",
        format_duration_single(u.elapsed),
        format_rate(u.rps_now),
        u.failed,
        u.workers_done,
        u.workers_total
    )
}

use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;

use loadgate_core::{
    Aggregator, BaselineStore, HistoricalRun, ProcessLauncher, RegressionReport, WorkerLauncher,
    http_in_process_launcher, regression, slo,
};

use crate::cli::RunArgs;
use crate::config_yaml::{self, ResolvedRun};
use crate::exit_codes::ExitCode;
use crate::output::{self, RunReport};
use crate::run_error::RunError;

/// Environment variable carrying the log filter into worker processes.
const WORKER_LOG_ENV: &str = "LOADGATE_LOG";

pub async fn run(args: RunArgs, log_level: Option<&str>) -> Result<ExitCode, RunError> {
    let resolved = resolve(&args).await.map_err(RunError::InvalidInput)?;
    let ResolvedRun {
        config,
        thresholds,
        policy,
        regression: regression_policy,
        baseline_dir,
    } = resolved;

    let out = output::formatter(args.output);
    out.print_header(&config, &thresholds);

    let config = Arc::new(config);
    let launcher: Arc<dyn WorkerLauncher> = if args.in_process {
        Arc::new(http_in_process_launcher(&config))
    } else {
        let exe = std::env::current_exe()
            .context("failed to locate the loadgate executable")
            .map_err(RunError::RuntimeError)?;
        let mut launcher = ProcessLauncher::new(exe, &config);
        if let Some(filter) = log_level {
            launcher = launcher.with_env(WORKER_LOG_ENV, filter);
        }
        Arc::new(launcher)
    };

    let mut aggregator = Aggregator::new(config.clone(), launcher);
    if let Some(progress) = out.progress() {
        aggregator = aggregator.with_progress(progress);
    }
    let aggregate = aggregator
        .run()
        .await
        .map_err(|err| RunError::from_core("load run failed", err))?;

    let compliance = slo::evaluate(
        &aggregate,
        &thresholds,
        &policy,
        &config.profile.name,
        Utc::now(),
    );

    let regression = match baseline_dir {
        Some(dir) => {
            let store = BaselineStore::new(dir);
            Some(compare_and_record(&store, &compliance, &regression_policy))
        }
        None => None,
    };

    let report = RunReport {
        compliance,
        regression,
        aggregate,
    };
    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.report_out {
        output::write_report(path, &report)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    Ok(ExitCode::from_compliance(
        report.compliance.passed,
        policy.fail_on_non_compliance,
    ))
}

async fn resolve(args: &RunArgs) -> anyhow::Result<ResolvedRun> {
    let file = match &args.config {
        Some(path) => config_yaml::load(path).await?,
        None => Default::default(),
    };
    config_yaml::resolve(file, args)
}

/// A broken baseline store never fails the run; it only costs the comparison.
fn compare_and_record(
    store: &BaselineStore,
    compliance: &slo::ComplianceReport,
    policy: &regression::RegressionPolicy,
) -> RegressionReport {
    let baseline = match store.latest(&compliance.profile) {
        Ok(baseline) => baseline,
        Err(err) => {
            tracing::warn!("ignoring baseline store: {err}");
            None
        }
    };

    let report = regression::compare(&compliance.metrics, baseline.as_ref(), policy);

    let run = HistoricalRun {
        timestamp: compliance.timestamp,
        profile: compliance.profile.clone(),
        metrics: compliance.metrics.clone(),
    };
    match store.record(&run) {
        Ok(path) => tracing::info!(path = %path.display(), "recorded baseline"),
        Err(err) => tracing::warn!("failed to record baseline: {err}"),
    }

    report
}

use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use loadgate_core::{
    AggregateMetrics, ComplianceReport, ProgressFn, RegressionReport, RunConfiguration,
    SloThreshold,
};

use crate::cli::OutputFormat;

mod human;
mod json;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunReport {
    pub compliance: ComplianceReport,
    /// `None` when baselines are disabled.
    pub regression: Option<RegressionReport>,
    pub aggregate: AggregateMetrics,
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, config: &RunConfiguration, thresholds: &[SloThreshold]);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}

/// Writes `report` as pretty-printed JSON, creating parent directories as needed.
pub(crate) async fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut bytes = serde_json::to_vec_pretty(report).context("failed to encode run report")?;
    bytes.push(b'\n');
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write report {}", path.display()))
}

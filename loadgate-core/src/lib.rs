mod config;
mod error;
mod metrics;
mod profile;

pub mod aggregator;
pub mod ipc;
pub mod launcher;
pub mod regression;
pub mod slo;
pub mod worker;

pub use aggregator::{
    Aggregator, AggregatorOptions, ProgressFn, ProgressUpdate, WorkerAssignment, partition,
};
pub use config::{DEFAULT_PROGRESS_EVERY, Endpoint, RunConfiguration};
pub use error::{Error, Result};
pub use ipc::{StatusClass, WorkerMessage, WorkerSpec};
pub use launcher::{InProcessLauncher, ProcessLauncher, WorkerLauncher, http_in_process_launcher};
pub use metrics::{
    AggregateMetrics, DerivedMetrics, LatencySource, WorkerOutcome, WorkerSummary,
};
pub use profile::{BUILTIN_PROFILES, Profile, ProfileShape, RampingSchedule, Stage};
pub use regression::{
    BaselineStore, HistoricalRun, RegressionPolicy, RegressionReport, RegressionStatus,
};
pub use slo::{
    ComparisonOp, ComplianceReport, CompliancePolicy, SloMetric, SloResult, SloThreshold,
};

//! Messages exchanged between the aggregator and worker processes.
//!
//! The aggregator hands a [`WorkerSpec`] to each worker on its command line; the worker answers
//! with one JSON-encoded [`WorkerMessage`] per stdout line.

use std::sync::Arc;
use std::time::Duration;

use loadgate_metrics::LatencyBuckets;
use serde::{Deserialize, Serialize};

use crate::aggregator::WorkerAssignment;
use crate::config::{Endpoint, validate_base_url, validate_endpoints, validate_headers};
use crate::error::{Error, Result};
use crate::worker::WorkerPlan;

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
pub enum StatusClass {
    Ok,
    ClientError,
    ServerError,
    Timeout,
    NetworkError,
}

impl StatusClass {
    /// 2xx is `Ok`, 5xx is `ServerError`, every other status is `ClientError`.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Ok,
            500..=599 => Self::ServerError,
            _ => Self::ClientError,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    pub client_error: u64,
    pub server_error: u64,
    pub timeout: u64,
    pub network_error: u64,
}

impl FailureCounts {
    pub fn record(&mut self, class: StatusClass) {
        match class {
            StatusClass::Ok => {}
            StatusClass::ClientError => self.client_error += 1,
            StatusClass::ServerError => self.server_error += 1,
            StatusClass::Timeout => self.timeout += 1,
            StatusClass::NetworkError => self.network_error += 1,
        }
    }

    /// `None` when the classes do not fit in a `u64` together.
    pub fn total(&self) -> Option<u64> {
        self.client_error
            .checked_add(self.server_error)?
            .checked_add(self.timeout)?
            .checked_add(self.network_error)
    }

    pub fn add(&mut self, other: &Self) {
        self.client_error = self.client_error.saturating_add(other.client_error);
        self.server_error = self.server_error.saturating_add(other.server_error);
        self.timeout = self.timeout.saturating_add(other.timeout);
        self.network_error = self.network_error.saturating_add(other.network_error);
    }

    /// True when no class went down compared to `prev`.
    pub fn dominates(&self, prev: &Self) -> bool {
        self.client_error >= prev.client_error
            && self.server_error >= prev.server_error
            && self.timeout >= prev.timeout
            && self.network_error >= prev.network_error
    }
}

/// Cumulative counters of one worker. Every field is monotonic over the worker's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub worker_id: u32,
    pub completed: u64,
    pub successful: u64,
    pub cumulative_duration_micros: u64,
    pub min_duration_micros: Option<u64>,
    pub max_duration_micros: Option<u64>,
    pub failures: FailureCounts,
}

impl ProgressSnapshot {
    pub fn empty(worker_id: u32) -> Self {
        Self {
            worker_id,
            completed: 0,
            successful: 0,
            cumulative_duration_micros: 0,
            min_duration_micros: None,
            max_duration_micros: None,
            failures: FailureCounts::default(),
        }
    }

    pub fn failed(&self) -> u64 {
        self.completed.saturating_sub(self.successful)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalReport {
    pub snapshot: ProgressSnapshot,
    pub latency: LatencyBuckets,
    pub max_in_flight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Progress(ProgressSnapshot),
    Terminal(TerminalReport),
    Fatal { worker_id: u32, message: String },
}

impl WorkerMessage {
    pub fn worker_id(&self) -> u32 {
        match self {
            Self::Progress(s) => s.worker_id,
            Self::Terminal(t) => t.snapshot.worker_id,
            Self::Fatal { worker_id, .. } => *worker_id,
        }
    }

    /// Single-line JSON, without the trailing newline.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

/// What a worker process needs to run its share of the load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub assignment: WorkerAssignment,
    pub target_base_url: String,
    pub endpoints: Vec<Endpoint>,
    pub headers: Vec<(String, String)>,
    pub request_timeout_ms: u64,
    pub progress_every: u64,
}

impl WorkerSpec {
    pub fn validate(&self) -> Result<()> {
        if self.assignment.concurrency_limit == 0 {
            return Err(Error::InvalidConcurrency);
        }
        validate_endpoints(&self.endpoints)?;
        validate_base_url(&self.target_base_url)?;
        validate_headers(&self.headers)?;
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidRequestTimeout);
        }
        if self.progress_every == 0 {
            return Err(Error::InvalidProgressEvery);
        }
        Ok(())
    }

    pub fn plan(&self) -> WorkerPlan {
        WorkerPlan::new(
            self.endpoints.clone(),
            Duration::from_millis(self.request_timeout_ms),
            self.progress_every,
        )
    }

    pub fn headers(&self) -> Arc<[(String, String)]> {
        self.headers.clone().into()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

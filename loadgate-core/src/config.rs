use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregator::{WorkerAssignment, partition};
use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::worker::WorkerPlan;

pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// A named request target, relative to the run's base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub path: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Everything needed to execute one run. Built once, then shared read-only.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub profile: Profile,
    pub total_requests: u64,
    pub worker_count: u32,
    pub concurrency_per_worker: u32,
    pub request_timeout: Duration,
    pub run_timeout: Duration,
    pub target_base_url: String,
    /// Forwarded verbatim on every request (e.g. `authorization`).
    pub headers: Vec<(String, String)>,
    pub endpoints: Vec<Endpoint>,
    pub progress_every: u64,
}

impl RunConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::InvalidWorkerCount);
        }
        if self.concurrency_per_worker == 0 {
            return Err(Error::InvalidConcurrency);
        }
        if self.total_requests < u64::from(self.worker_count) {
            return Err(Error::InsufficientRequests {
                requests: self.total_requests,
                workers: self.worker_count,
            });
        }
        validate_endpoints(&self.endpoints)?;
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidRequestTimeout);
        }
        if self.run_timeout.is_zero() {
            return Err(Error::InvalidRunTimeout);
        }
        if self.progress_every == 0 {
            return Err(Error::InvalidProgressEvery);
        }
        validate_base_url(&self.target_base_url)?;
        validate_headers(&self.headers)?;
        self.profile.validate()
    }

    pub fn assignments(&self) -> Vec<WorkerAssignment> {
        partition(
            self.total_requests,
            self.worker_count,
            self.concurrency_per_worker,
        )
    }

    pub fn worker_plan(&self) -> WorkerPlan {
        WorkerPlan::new(
            self.endpoints.clone(),
            self.request_timeout,
            self.progress_every,
        )
    }
}

pub(crate) fn validate_endpoints(endpoints: &[Endpoint]) -> Result<()> {
    if endpoints.is_empty() {
        return Err(Error::NoEndpoints);
    }
    for e in endpoints {
        if e.name.trim().is_empty() {
            return Err(Error::InvalidEndpoint {
                name: e.path.clone(),
                reason: "name must not be empty",
            });
        }
        if !e.path.starts_with('/') {
            return Err(Error::InvalidEndpoint {
                name: e.name.clone(),
                reason: "path must start with `/`",
            });
        }
    }
    Ok(())
}

pub(crate) fn validate_headers(headers: &[(String, String)]) -> Result<()> {
    for (name, value) in headers {
        loadgate_http::check_header(name, value).map_err(|err| Error::InvalidHeader {
            name: name.clone(),
            reason: std::error::Error::source(&err)
                .map_or_else(|| err.to_string(), |source| source.to_string()),
        })?;
    }
    Ok(())
}

pub(crate) fn validate_base_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw).map_err(|_| Error::InvalidBaseUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(Error::InvalidBaseUrl(raw.to_string())),
    }
}

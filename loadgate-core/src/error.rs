use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`workers` must be a positive integer")]
    InvalidWorkerCount,

    #[error("`concurrency` must be a positive integer")]
    InvalidConcurrency,

    #[error("`requests` ({requests}) must be at least the number of workers ({workers})")]
    InsufficientRequests { requests: u64, workers: u32 },

    #[error("`endpoints` must be a non-empty array of {{ name, path }}")]
    NoEndpoints,

    #[error("invalid endpoint `{name}`: {reason}")]
    InvalidEndpoint { name: String, reason: &'static str },

    #[error("`timeout` must be a positive duration")]
    InvalidRequestTimeout,

    #[error("`runTimeout` must be a positive duration")]
    InvalidRunTimeout,

    #[error("`progressEvery` must be a positive integer")]
    InvalidProgressEvery,

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid base url `{0}` (expected an absolute http:// or https:// URL)")]
    InvalidBaseUrl(String),

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("stage {index} of profile `{profile}` must have a positive duration")]
    ZeroStageDuration { profile: String, index: usize },

    #[error(
        "unknown profile `{0}` (expected `smoke`, `baseline`, `stress`, `spike`, `soak`, `peak`, or explicit stages)"
    )]
    UnknownProfile(String),

    #[error("invalid SLO threshold for `{metric}`: {reason}")]
    InvalidThreshold { metric: String, reason: String },

    #[error("failed to launch worker {worker_id}: {source}")]
    Spawn {
        worker_id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("baseline store error at `{}`: {message}", path.display())]
    Baseline { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// True for failures caused by the run configuration rather than by the environment.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidWorkerCount
                | Self::InvalidConcurrency
                | Self::InsufficientRequests { .. }
                | Self::NoEndpoints
                | Self::InvalidEndpoint { .. }
                | Self::InvalidRequestTimeout
                | Self::InvalidRunTimeout
                | Self::InvalidProgressEvery
                | Self::InvalidHeader { .. }
                | Self::InvalidBaseUrl(_)
                | Self::InvalidStages
                | Self::ZeroStageDuration { .. }
                | Self::UnknownProfile(_)
                | Self::InvalidThreshold { .. }
        )
    }
}

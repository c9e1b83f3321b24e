pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure class, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    InvalidHeader,
    Connect,
    Request,
    Timeout,
    BodyRead,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported: {0}")]
    UnsupportedScheme(String),

    #[error("invalid header `{name}`")]
    InvalidHeader {
        name: String,
        #[source]
        source: http::Error,
    },

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        match self {
            Self::InvalidUrl(_) => HttpTransportErrorKind::InvalidUrl,
            Self::UnsupportedScheme(_) => HttpTransportErrorKind::UnsupportedScheme,
            Self::InvalidHeader { .. } => HttpTransportErrorKind::InvalidHeader,
            Self::Request(_) if self.is_timeout() => HttpTransportErrorKind::Timeout,
            Self::Request(e) if e.is_connect() => HttpTransportErrorKind::Connect,
            Self::Request(_) => HttpTransportErrorKind::Request,
            Self::BodyRead(_) => HttpTransportErrorKind::BodyRead,
        }
    }

    /// True when an I/O timeout (e.g. the connect timeout) caused the failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            if let Some(io) = err.downcast_ref::<std::io::Error>()
                && io.kind() == std::io::ErrorKind::TimedOut
            {
                return true;
            }
            source = err.source();
        }
        false
    }
}

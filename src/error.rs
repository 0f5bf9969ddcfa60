use std::time::Duration;

use thiserror::Error;

// ------------------------------------------------------------
// Registry errors
// ------------------------------------------------------------
//
// Raised while enumerating registered users. Any of these ends
// the aggregation pass (see `AggregationError`).
//
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("registry i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

// ------------------------------------------------------------
// Per-call fetch errors
// ------------------------------------------------------------
//
// Raised by a `MetricFetcher` for one user and one call.
// These never leave the Worker: they are turned into a failed
// `MetricResult`.
//
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authorization rejected: {0}")]
    Auth(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// True when the remote answered but the payload lacked the
    /// expected structure.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FetchError::Malformed(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

// ------------------------------------------------------------
// Pass-level errors
// ------------------------------------------------------------
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("user registry unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
}

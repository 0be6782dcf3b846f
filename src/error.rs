//! Error taxonomy for the ingestion pipeline.
//!
//! Fetch and shape failures are local to one date or one event: they are
//! logged and the run continues. Only configuration and store failures, or
//! an API that failed for every date, end a run.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single API request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Http { status: StatusCode, url: String },

    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Stable short reason used in logs and summaries.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Http { .. } => "http_error",
            FetchError::Transport { .. } => "transport_error",
            FetchError::Decode { .. } => "decode_error",
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Transport failures, rate limiting and server errors may succeed on a
    /// later attempt. Client errors and undecodable bodies will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::Decode { .. } => false,
        }
    }
}

/// A required field is absent or carries a value the pipeline cannot use.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("unknown team type {0} (expected 1 = singles or 2 = doubles)")]
    UnknownTeamType(i64),

    #[error("start timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("payload does not match the expected shape: {0}")]
    Malformed(String),
}

/// Failure while ingesting one unit of work (a date, an event, a statistics pass).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("no match stored for event {0}")]
    MatchNotFound(i64),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Failure of a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid date range: {0}")]
    InvalidRange(String),

    #[error("event list could not be fetched for any of the {days} requested dates")]
    ApiUnreachable { days: usize },

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

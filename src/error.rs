use thiserror::Error;

use crate::types::GameId;

/// Failures raised while ingesting games.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetching {url} failed after {attempts} attempts: {source}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: SessionError,
    },

    #[error("malformed clock text {0:?}")]
    MalformedTime(String),

    #[error("unrecognized markup: {0}")]
    ParseFailure(String),

    #[error("cache entry {key} is corrupt: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("cache entry {key} could not be encoded: {reason}")]
    Encode { key: String, reason: String },

    #[error("test fraction must be strictly between 0 and 1, got {0}")]
    InvalidFraction(f64),

    #[error("game {0} has no date and cannot be fetched")]
    Unscheduled(GameId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures from a single page-session attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http {status} from {url}")]
    Status { status: u16, url: String },

    #[error("session setup failed: {0}")]
    Setup(String),

    #[error("webdriver command failed: {0}")]
    Driver(String),

    #[error("no page loaded")]
    NothingLoaded,
}

pub type Result<T> = std::result::Result<T, IngestError>;

//! Error types for rowrange.
//!
//! Malformed records are not errors: they are counted by the readers and
//! dropped. Everything here aborts the `read` call that hit it.

use thiserror::Error;

/// Main error type for rowrange operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Remote store answered with a non-success status
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Request failed before a response arrived and was not retried
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Transient failures persisted past the retry budget
    #[error("giving up on {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Response did not honour the byte-range contract
    #[error("protocol violation from {url}: {reason}")]
    Protocol { url: String, reason: String },

    /// Metadata lookup failed
    #[error("metadata lookup failed: {0}")]
    Metadata(String),

    /// Manifest or descriptor could not be decoded
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Columnar codec failure
    #[error("parquet error: {0}")]
    Columnar(#[from] parquet::errors::ParquetError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn protocol(url: &str, reason: impl Into<String>) -> Self {
        Error::Protocol {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for rowrange operations.
pub type Result<T> = std::result::Result<T, Error>;

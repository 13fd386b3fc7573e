use std::path::PathBuf;

use thiserror::Error;

/// Failure reaching or decoding the detection feed. The run is skipped.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Feed network error: {0}")]
    Network(String),

    #[error("Feed returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Feed parse error: {0}")]
    Parse(String),
}

/// Durable store operation failed. The job aborts without touching the cache.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Store returned {returned} ids for a batch of {expected}")]
    BatchMismatch { expected: usize, returned: usize },
}

/// Per-subscriber delivery failure. Never aborts a fan-out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Delivery token is no longer valid")]
    InvalidToken,

    #[error("Delivery failed: {0}")]
    Other(String),
}

/// Cache snapshot could not be read or written.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Snapshot at {path} has unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

/// A feed row that cannot become a detection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Missing field: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {value:?}")]
    Invalid { field: &'static str, value: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(String),

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

//! Error types for experiment tracking.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by tracking backends.
#[derive(Error, Debug)]
pub enum TrackingError {
    /// A filesystem operation of the local store failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Run metadata or a request body could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request itself failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The tracking server answered with an error status.
    #[error("Tracking server returned {status} for {endpoint}: {error_code}: {message}")]
    Api {
        status: u16,
        endpoint: String,
        error_code: String,
        message: String,
    },

    /// A param, metric, experiment or artifact name is not usable.
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A param was logged twice with different values.
    #[error("Param '{key}' already logged with value '{existing}', refusing '{value}'")]
    ParamConflict {
        key: String,
        existing: String,
        value: String,
    },

    /// The run does not exist in the store.
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// The server answered with something that is not a model version number.
    #[error("Invalid model version '{version}'")]
    InvalidVersion { version: String },
}

impl TrackingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A specialized `Result` type for tracking operations.
pub type TrackingResult<T> = Result<T, TrackingError>;

//! Error types for Runvault
//!
//! This module defines the errors raised while validating configuration
//! and loading run records from disk.

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for Runvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Runvault
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("collection name \"{0}\" is reserved, please use a different one")]
    ReservedCollectionName(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Record loading errors
    #[error("cannot find the run directory {0}")]
    RunDirectoryNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {path}: {source}")]
    MalformedRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "metric '{name}' has mismatched lengths: {steps} steps, {values} values, {timestamps} timestamps"
    )]
    MetricLengthMismatch {
        name: String,
        steps: usize,
        values: usize,
        timestamps: usize,
    },
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check if this error originates from configuration rather than input data
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::ReservedCollectionName(_) | Self::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_config() {
        assert!(Error::ReservedCollectionName("fs.files".into()).is_config());
        assert!(Error::invalid_config("both url and client").is_config());
        assert!(!Error::RunDirectoryNotFound(PathBuf::from("/nope")).is_config());
    }

    #[test]
    fn test_metric_mismatch_message() {
        let err = Error::MetricLengthMismatch {
            name: "loss".into(),
            steps: 2,
            values: 1,
            timestamps: 2,
        };
        assert_eq!(
            err.to_string(),
            "metric 'loss' has mismatched lengths: 2 steps, 1 values, 2 timestamps"
        );
    }
}

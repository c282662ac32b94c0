//! Error types for run ingestion
//!
//! Every fatal kind stops the current ingestion attempt and is returned to
//! the caller. Transient store failures during follow-up saves never reach
//! this type; the [`DocumentWriter`](crate::DocumentWriter) drops them.

use runvault_common::RunId;
use runvault_meta_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("couldn't find run to overwrite with _id={0}")]
    NotFound(RunId),

    #[error("collection name \"{0}\" is reserved, please use a different one")]
    ReservedCollectionName(String),

    #[error("cannot overwrite run {0} more than once")]
    DoubleOverwrite(RunId),

    #[error("run contained an unserializable entry (most likely in the info): {0}")]
    UnserializableEntry(String),

    #[error("store connection failed: {0}")]
    TransientConnection(String),

    #[error("source file '{name}' is missing from {path}")]
    MissingSourceFile {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run id {0} is already taken")]
    DuplicateRunId(RunId),

    #[error("no run id left after {0} in collection '{1}'")]
    IdSpaceExhausted(RunId, String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "metric '{name}' has mismatched lengths: {steps} steps, {values} values, {timestamps} timestamps"
    )]
    InvalidMetricBatch {
        name: String,
        steps: usize,
        values: usize,
        timestamps: usize,
    },

    #[error("store error: {0}")]
    Store(#[source] StoreError),

    #[error("run record error: {0}")]
    Record(#[source] runvault_common::Error),
}

impl ClientError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check if retrying the whole ingestion may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientConnection(_))
    }

    /// Check if the error was raised while constructing the client
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::ReservedCollectionName(_) | Self::InvalidConfig(_)
        )
    }
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidDocument(msg) => Self::UnserializableEntry(msg),
            StoreError::Transient(msg) => Self::TransientConnection(msg),
            other => Self::Store(other),
        }
    }
}

impl From<runvault_common::Error> for ClientError {
    fn from(e: runvault_common::Error) -> Self {
        use runvault_common::Error as E;
        match e {
            E::ReservedCollectionName(name) => Self::ReservedCollectionName(name),
            E::InvalidConfig(msg) => Self::InvalidConfig(msg),
            E::MetricLengthMismatch {
                name,
                steps,
                values,
                timestamps,
            } => Self::InvalidMetricBatch {
                name,
                steps,
                values,
                timestamps,
            },
            other => Self::Record(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: ClientError = StoreError::InvalidDocument("key must not contain '.'".into()).into();
        assert!(matches!(err, ClientError::UnserializableEntry(_)));

        let err: ClientError = StoreError::Transient("connection reset".into()).into();
        assert!(err.is_retryable());

        let err: ClientError = StoreError::RunNotFound {
            collection: "runs".into(),
            id: 3,
        }
        .into();
        assert!(matches!(err, ClientError::Store(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_common_error_mapping() {
        let err: ClientError =
            runvault_common::Error::ReservedCollectionName("search_spaces".into()).into();
        assert!(matches!(err, ClientError::ReservedCollectionName(ref n) if n == "search_spaces"));
        assert!(err.is_construction());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ClientError::NotFound(12).to_string(),
            "couldn't find run to overwrite with _id=12"
        );
        assert_eq!(
            ClientError::DoubleOverwrite(12).to_string(),
            "cannot overwrite run 12 more than once"
        );
        assert_eq!(
            ClientError::IdSpaceExhausted(RunId::MAX, "runs".into()).to_string(),
            format!("no run id left after {} in collection 'runs'", RunId::MAX)
        );
    }
}

//! Error types for the local record store and pending write queue.

use crate::id::TempId;
use spendsync_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the local half of the write buffer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A persisted value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A persisted value was written by an unknown format version.
    #[error("unsupported format version for {key}: found {found}, expected {expected}")]
    UnsupportedVersion {
        /// Rendered storage key.
        key: String,
        /// Version found in the envelope.
        found: u16,
        /// Version this build understands.
        expected: u16,
    },

    /// A second intent was submitted for a temporary record.
    #[error("record {0} already has a pending write intent")]
    DuplicateIntent(TempId),

    /// No dead letter exists for the given temporary id.
    #[error("no rejected write intent for record {0}")]
    UnknownDeadLetter(TempId),

    /// An amount string could not be parsed.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed temporary id.
    #[error("invalid temporary id: {0}")]
    InvalidTempId(String),
}

impl CoreError {
    /// Creates a codec error from any displayable error.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::DuplicateIntent(TempId::new(7));
        assert_eq!(err.to_string(), "record tmp-7 already has a pending write intent");

        let err = CoreError::UnsupportedVersion {
            key: "expenses.queue.v1".into(),
            found: 9,
            expected: 1,
        };
        assert!(err.to_string().contains("found 9"));
    }

    #[test]
    fn storage_errors_convert() {
        let err: CoreError = StorageError::WriteRefused("k".into()).into();
        assert!(matches!(err, CoreError::Storage(_)));
    }
}

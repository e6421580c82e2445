//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A storage key was malformed.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// Another process holds the data directory.
    #[error("storage directory is locked by another process: {0}")]
    Locked(String),

    /// The storage contents are corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A write was refused (fault injection or read-only medium).
    #[error("write refused for key {0}")]
    WriteRefused(String),
}

//! Error types for the sync engine.

use spendsync_core::CoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Longest server response body kept in an error message.
const MAX_BODY_CHARS: usize = 512;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The request did not complete within the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// No credential was available when the request was about to be sent.
    #[error("no credential available")]
    MissingCredential,

    /// The server refused the credential.
    #[error("authentication failed ({status}): {message}")]
    Unauthorized {
        /// HTTP status.
        status: u16,
        /// Server message.
        message: String,
    },

    /// The server rejected the request as invalid.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Server message.
        message: String,
    },

    /// The server failed or asked the client to back off.
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status.
        status: u16,
        /// Server message.
        message: String,
    },

    /// Protocol error (unexpected status or unreadable response).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local persistence error while applying a sync result.
    #[error("local state error: {0}")]
    Local(#[from] CoreError),
}

/// How the drain reacts to a failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network trouble, timeouts, 5xx, throttling. Retried on a later pass.
    Transient,
    /// Missing or refused credential. Retried once the user signs in again.
    Authentication,
    /// The server will never accept this payload as sent. Only server
    /// rejections land here.
    Permanent,
    /// The client could not build or send the request, e.g. a malformed
    /// base URL. Halts until the configuration is fixed.
    Client,
    /// The device could not persist a sync result.
    Local,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Maps a non-success HTTP status and its response body to an error.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = body_excerpt(body);
        match status {
            401 | 403 => Self::Unauthorized { status, message },
            408 | 429 | 500..=599 => Self::ServerError { status, message },
            400..=499 => Self::Rejected { status, message },
            _ => Self::Protocol(format!("unexpected status {status}: {message}")),
        }
    }

    /// Classifies the error for the drain's halt/dead-letter decision.
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::MissingCredential | SyncError::Unauthorized { .. } => {
                FailureKind::Authentication
            }
            SyncError::Rejected { .. } => FailureKind::Permanent,
            SyncError::Transport {
                retryable: false, ..
            } => FailureKind::Client,
            SyncError::Local(_) => FailureKind::Local,
            SyncError::Transport { .. }
            | SyncError::Timeout
            | SyncError::ServerError { .. }
            | SyncError::Protocol(_) => FailureKind::Transient,
        }
    }

    /// Returns true if this error can be retried without user action.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Unauthorized { status, .. }
            | SyncError::Rejected { status, .. }
            | SyncError::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() <= MAX_BODY_CHARS {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MAX_BODY_CHARS).collect();
        cut.push('…');
        cut
    }
}

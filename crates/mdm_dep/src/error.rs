//! Error types for DEP synchronization.

use mdm_events::BusError;
use mdm_store::StoreError;
use thiserror::Error;

/// Result type for DEP client calls.
pub type DepResult<T> = Result<T, DepError>;

/// Result type for watcher and config store operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by a [`DepClient`](crate::DepClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepError {
    /// The fetch cursor has no more devices to return.
    #[error("cursor exhausted")]
    CursorExhausted,

    /// The cursor is older than the server accepts.
    #[error("cursor expired")]
    CursorExpired,

    /// The server did not recognize the cursor.
    #[error("cursor invalid")]
    CursorInvalid,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// The server answered with an error status.
    #[error("DEP API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// A request or response body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl DepError {
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

    /// Creates an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Returns true for the cursor kinds.
    pub fn is_cursor_error(&self) -> bool {
        matches!(
            self,
            Self::CursorExhausted | Self::CursorExpired | Self::CursorInvalid
        )
    }
}

/// Errors from the watcher and the DEP config stores.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Only the wildcard filter is supported.
    #[error("invalid auto-assigner filter {0:?}: only \"*\" is supported")]
    InvalidFilter(String),

    /// Persisting watcher state failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A roster event could not be encoded.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Building a client from credentials failed.
    #[error("DEP client error: {0}")]
    Client(#[from] DepError),
}

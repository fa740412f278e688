//! Error types for command queues.

use mdm_events::BusError;
use mdm_store::StoreError;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur in a command queue.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The device reported a status this queue does not understand.
    #[error("unknown command status: {0:?}")]
    UnknownStatus(String),

    /// A command with this UUID is already tracked for the identity.
    #[error("command {command_uuid} already queued for {identity}")]
    DuplicateCommand {
        /// Queue identity.
        identity: String,
        /// Command UUID.
        command_uuid: String,
    },

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Event decoding or publishing failure.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

impl QueueError {
    /// Creates a duplicate command error.
    pub fn duplicate(identity: impl Into<String>, command_uuid: impl Into<String>) -> Self {
        Self::DuplicateCommand {
            identity: identity.into(),
            command_uuid: command_uuid.into(),
        }
    }
}

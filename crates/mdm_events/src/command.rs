//! Command queue events.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A command submitted for delivery to an enrolled identity.
///
/// Carried on both the structured and the raw command topics; the payload is
/// opaque to the queue either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    /// Target identity (UDID, user ID, or enrollment ID).
    pub udid: String,
    /// Command UUID.
    pub command_uuid: String,
    /// Serialized command payload.
    pub payload: Bytes,
}

impl CommandEvent {
    /// Creates a command event.
    pub fn new(udid: impl Into<String>, command_uuid: impl Into<String>, payload: Bytes) -> Self {
        Self {
            udid: udid.into(),
            command_uuid: command_uuid.into(),
            payload,
        }
    }
}

/// Published once a command has been persisted in a device queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandQueuedEvent {
    /// Identity the command was queued for.
    pub udid: String,
    /// Command UUID.
    pub command_uuid: String,
}

//! Error types for the event bus.

use thiserror::Error;

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur publishing or decoding events.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus has been closed.
    #[error("bus channel closed")]
    Closed,

    /// A subscriber's buffer is full; the message was not delivered.
    #[error("subscriber buffer full on {topic} (capacity {capacity})")]
    Full {
        /// Topic published on.
        topic: String,
        /// Configured buffer size.
        capacity: usize,
    },

    /// The underlying transport failed.
    #[error("bus transport error: {0}")]
    Transport(String),

    /// An envelope could not be encoded or decoded.
    #[error("event codec error: {0}")]
    Codec(String),
}

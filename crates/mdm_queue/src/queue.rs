//! The command queue contract.

use crate::error::QueueResult;
use crate::model::{Command, Response};
use bytes::Bytes;

/// A per-identity queue of MDM commands.
///
/// Implementations apply a device response and pick the next payload in one
/// step, so concurrent check-ins for one identity never lose an update.
pub trait CommandQueue: Send + Sync {
    /// Applies `response` and returns the next payload to send, if any.
    ///
    /// Fails with [`QueueError::UnknownStatus`](crate::QueueError::UnknownStatus)
    /// for a status outside the known set.
    fn next(&self, response: &Response) -> QueueResult<Option<Bytes>>;

    /// Drops pending and deferred commands for `identity`.
    fn clear(&self, identity: &str) -> QueueResult<()>;

    /// Returns outstanding commands: pending first, then deferred.
    fn view_queue(&self, identity: &str) -> QueueResult<Vec<Command>>;

    /// Appends a command for `identity`.
    fn enqueue(&self, identity: &str, command: Command) -> QueueResult<()>;
}

//! Topic names.

/// Structured commands submitted for a device.
pub const COMMAND_TOPIC: &str = "mdm.Command";

/// Pre-serialized commands that bypass the structured encoder.
pub const RAW_COMMAND_TOPIC: &str = "mdm.RawCommand";

/// Published by the queue after a command has been persisted.
pub const COMMAND_QUEUED_TOPIC: &str = "mdm.CommandQueued";

/// DEP roster deltas published by the watcher.
pub const DEP_SYNC_TOPIC: &str = "mdm.DepSync";

/// DEP credentials became available.
pub const DEP_TOKEN_TOPIC: &str = "mdm.TokenAdded";

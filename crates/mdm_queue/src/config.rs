//! Queue configuration.

/// Configuration for [`StoreQueue`](crate::StoreQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Keep acknowledged and failed commands in the device record.
    pub history: bool,
}

impl QueueConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self { history: true }
    }

    /// Enables or disables command history.
    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

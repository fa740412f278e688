//! Watcher configuration.

use std::time::Duration;

/// Configuration for the DEP [`Watcher`](crate::Watcher).
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Time between sync passes while tailing.
    pub sync_interval: Duration,
    /// Devices requested per page.
    pub fetch_limit: u32,
    /// Age after which a persisted cursor is discarded on startup.
    pub cursor_validity: Duration,
}

impl WatcherConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            sync_interval: Duration::from_secs(30 * 60),
            fetch_limit: 100,
            cursor_validity: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    /// Sets the sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the page size.
    pub fn with_fetch_limit(mut self, limit: u32) -> Self {
        self.fetch_limit = limit.max(1);
        self
    }

    /// Sets the cursor validity window.
    pub fn with_cursor_validity(mut self, validity: Duration) -> Self {
        self.cursor_validity = validity;
        self
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(1800));
        assert_eq!(config.fetch_limit, 100);
        assert_eq!(config.cursor_validity, Duration::from_secs(604_800));
    }

    #[test]
    fn builder() {
        let config = WatcherConfig::new()
            .with_sync_interval(Duration::from_secs(5))
            .with_fetch_limit(0)
            .with_cursor_validity(Duration::from_secs(60));
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.fetch_limit, 1);
        assert_eq!(config.cursor_validity, Duration::from_secs(60));
    }
}

//! Persisted DEP cursor.

use crate::error::{SyncError, SyncResult};
use mdm_store::MapStore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Bucket holding the watcher state.
pub const DEP_SYNC_BUCKET: &str = "mdm.DEPSync";

const CURSOR_KEY: &str = "cursor";

/// A DEP continuation token and when it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Opaque token. Empty before the first fetch.
    pub value: String,
    /// When the token was received.
    pub created_at: SystemTime,
}

impl Cursor {
    /// Creates a cursor issued now.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            created_at: SystemTime::now(),
        }
    }

    /// Returns true if no token has been issued.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Returns true if the cursor is set and younger than `validity` at `now`.
    ///
    /// A `created_at` in the future counts as fresh.
    pub fn is_fresh(&self, now: SystemTime, validity: Duration) -> bool {
        if self.is_empty() {
            return false;
        }
        match now.duration_since(self.created_at) {
            Ok(age) => age < validity,
            Err(_) => true,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            value: String::new(),
            created_at: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Loads and saves the watcher's cursor.
#[derive(Debug, Clone)]
pub struct CursorStore {
    store: MapStore,
}

impl CursorStore {
    /// Creates a cursor store.
    pub fn new(store: MapStore) -> Self {
        Self { store }
    }

    /// Loads the cursor. A missing record is an empty cursor.
    pub fn load(&self) -> SyncResult<Cursor> {
        Ok(self
            .store
            .get_typed(DEP_SYNC_BUCKET, CURSOR_KEY)?
            .unwrap_or_default())
    }

    /// Saves the cursor.
    pub fn save(&self, cursor: &Cursor) -> SyncResult<()> {
        self.store.transaction(|txn| {
            txn.put_typed(DEP_SYNC_BUCKET, CURSOR_KEY, cursor)?;
            Ok::<_, SyncError>(())
        })?;
        debug!(cursor = %cursor.value, "cursor saved");
        Ok(())
    }

    /// Replaces the cursor with an empty one.
    pub fn reset(&self) -> SyncResult<()> {
        self.save(&Cursor::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    #[test]
    fn freshness() {
        let now = SystemTime::now();
        let cursor = Cursor {
            value: "C".into(),
            created_at: now - Duration::from_secs(60),
        };
        assert!(cursor.is_fresh(now, WEEK));

        let stale = Cursor {
            value: "C".into(),
            created_at: now - WEEK - Duration::from_secs(1),
        };
        assert!(!stale.is_fresh(now, WEEK));

        let future = Cursor {
            value: "C".into(),
            created_at: now + Duration::from_secs(60),
        };
        assert!(future.is_fresh(now, WEEK));

        assert!(!Cursor::default().is_fresh(now, WEEK));
        assert!(!Cursor::new("").is_fresh(now, WEEK));
    }

    #[test]
    fn missing_cursor_is_empty() {
        let cursors = CursorStore::new(MapStore::open_in_memory());
        assert!(cursors.load().unwrap().is_empty());
    }

    #[test]
    fn save_load_reset() {
        let cursors = CursorStore::new(MapStore::open_in_memory());
        let cursor = Cursor::new("MTU0NjQ");
        cursors.save(&cursor).unwrap();
        assert_eq!(cursors.load().unwrap(), cursor);

        cursors.reset().unwrap();
        assert!(cursors.load().unwrap().is_empty());
    }
}

//! In-memory backend.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory log backend.
///
/// Clones share the same buffer, so a test can keep a handle to the bytes a
/// store wrote and reopen a second store over them to exercise replay.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend over pre-existing log bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the log bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StoreError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StoreResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        let mut data = self.data.write();
        let current = data.len() as u64;
        if new_size > current {
            return Err(StoreError::invalid_argument(format!(
                "cannot truncate log of {current} bytes to {new_size}"
            )));
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

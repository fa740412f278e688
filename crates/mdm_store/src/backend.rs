//! Storage backend trait definition.

use crate::error::StoreResult;

/// A byte log underneath the map store.
///
/// Backends are **opaque byte stores**. The map store owns the record format;
/// backends only append bytes, read them back, and make them durable.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, all appended data survives process termination
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends past the current size or an I/O
    /// error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>>;

    /// Appends data to the end of the log and returns its offset.
    fn append(&mut self, data: &[u8]) -> StoreResult<u64>;

    /// Returns the current size of the log in bytes.
    fn size(&self) -> StoreResult<u64>;

    /// Makes all appended data durable.
    fn sync(&mut self) -> StoreResult<()>;

    /// Truncates the log to `new_size` bytes.
    ///
    /// Used to cut a torn tail after recovery and to roll back a failed append.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size.
    fn truncate(&mut self, new_size: u64) -> StoreResult<()>;

    /// Reads the whole log.
    fn read_all(&self) -> StoreResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }
}

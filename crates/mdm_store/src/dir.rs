//! Store directory layout and process lock.
//!
//! ```text
//! <dir>/
//! ├── LOCK            advisory lock held while the store is open
//! ├── store.log       commit log
//! └── store.log.tmp   compaction output before it is renamed over store.log
//! ```

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "store.log";
const COMPACT_FILE: &str = "store.log.tmp";

/// An opened store directory.
///
/// Holding a `StoreDir` holds an exclusive lock on the directory; it is
/// released when the value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens a store directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the commit log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Path compaction writes to before the atomic rename.
    #[must_use]
    pub fn compact_path(&self) -> PathBuf {
        self.path.join(COMPACT_FILE)
    }

    /// Atomically replaces the commit log with the compaction output.
    pub(crate) fn install_compacted(&self) -> StoreResult<()> {
        fs::rename(self.compact_path(), self.log_path())?;
        // Persist the rename itself where the platform allows it.
        if let Ok(dir) = File::open(&self.path) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

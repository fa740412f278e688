//! The map store.

use crate::backend::StorageBackend;
use crate::codec;
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::log::{self, LogRecord, Mutation, RecordKind};
use crate::memory::InMemoryBackend;
use crate::txn::Transaction;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type Buckets = HashMap<String, BTreeMap<String, Vec<u8>>>;

/// Summary of the store's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of non-empty buckets.
    pub buckets: usize,
    /// Total number of entries.
    pub entries: usize,
    /// Size of the commit log in bytes.
    pub log_bytes: u64,
    /// Transactions committed since open.
    pub commits: u64,
}

pub(crate) struct StoreInner {
    data: RwLock<Buckets>,
    log: Mutex<Box<dyn StorageBackend>>,
    write_lock: Mutex<()>,
    dir: Option<StoreDir>,
    commits: AtomicU64,
}

impl StoreInner {
    pub(crate) fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.data
            .read()
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    pub(crate) fn list(&self, bucket: &str) -> Vec<(String, Vec<u8>)> {
        self.data
            .read()
            .get(bucket)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Appends and syncs one commit record, then applies it to memory.
    ///
    /// Callers hold the writer lock.
    pub(crate) fn commit(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        let record = LogRecord::commit(mutations);
        let bytes = record.encode()?;

        {
            let mut log = self.log.lock();
            let before = log.size()?;
            if let Err(e) = log.append(&bytes).and_then(|_| log.sync()) {
                if let Err(rollback) = log.truncate(before) {
                    warn!(error = %rollback, "failed to roll back partial commit record");
                }
                return Err(e);
            }
        }

        apply(&mut self.data.write(), &record);
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// A transactional, bucketed key/value store.
///
/// Cloning is cheap; clones share the same underlying store.
///
/// # Example
///
/// ```rust
/// use mdm_store::MapStore;
///
/// let store = MapStore::open_in_memory();
/// let mut txn = store.begin();
/// txn.put("cursor", "singleton", vec![1, 2, 3]).unwrap();
/// txn.commit().unwrap();
///
/// assert_eq!(store.list("cursor").len(), 1);
/// ```
#[derive(Clone)]
pub struct MapStore {
    inner: Arc<StoreInner>,
}

impl MapStore {
    /// Opens or creates a store in `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the directory,
    /// or a corruption error if the log cannot be replayed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let dir = StoreDir::open(path)?;
        let stale = dir.compact_path();
        if stale.exists() {
            warn!(path = %stale.display(), "removing leftover compaction output");
            std::fs::remove_file(&stale)?;
        }
        let backend = FileBackend::open(&dir.log_path())?;
        Self::open_inner(Box::new(backend), Some(dir))
    }

    /// Creates an empty store that lives only in memory.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::from_parts(Box::new(InMemoryBackend::new()), Buckets::new(), None)
    }

    /// Opens a store over an arbitrary backend, replaying its contents.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        Self::open_inner(backend, None)
    }

    fn open_inner(mut backend: Box<dyn StorageBackend>, dir: Option<StoreDir>) -> StoreResult<Self> {
        let bytes = backend.read_all()?;
        let replay = log::replay(&bytes)?;

        if replay.valid_len < bytes.len() as u64 {
            warn!(
                valid = replay.valid_len,
                total = bytes.len(),
                "discarding torn record at end of log"
            );
            backend.truncate(replay.valid_len)?;
        }

        let mut data = Buckets::new();
        for (_, record) in &replay.records {
            apply(&mut data, record);
        }

        debug!(
            records = replay.records.len(),
            bytes = replay.valid_len,
            buckets = data.len(),
            "store opened"
        );

        Ok(Self::from_parts(backend, data, dir))
    }

    fn from_parts(backend: Box<dyn StorageBackend>, data: Buckets, dir: Option<StoreDir>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                data: RwLock::new(data),
                log: Mutex::new(backend),
                write_lock: Mutex::new(()),
                dir,
                commits: AtomicU64::new(0),
            }),
        }
    }

    /// Begins a write transaction.
    ///
    /// Blocks while another transaction is open.
    pub fn begin(&self) -> Transaction<'_> {
        let guard = self.inner.write_lock.lock();
        Transaction::new(&self.inner, guard)
    }

    /// Runs `f` in a transaction and commits it if `f` succeeds.
    ///
    /// If `f` returns an error the staged writes are discarded.
    pub fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut txn = self.begin();
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Reads a committed entry.
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.inner.get(bucket, key)
    }

    /// Reads and decodes a committed entry.
    pub fn get_typed<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> StoreResult<Option<T>> {
        self.get(bucket, key)
            .map(|bytes| codec::decode(&bytes))
            .transpose()
    }

    /// Lists a bucket's committed entries in key order.
    pub fn list(&self, bucket: &str) -> Vec<(String, Vec<u8>)> {
        self.inner.list(bucket)
    }

    /// Returns the names of all non-empty buckets, sorted.
    pub fn buckets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.data.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the store directory, if the store is directory-backed.
    pub fn dir(&self) -> Option<&Path> {
        self.inner.dir.as_ref().map(StoreDir::path)
    }

    /// Returns a summary of the store.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let data = self.inner.data.read();
        Ok(StoreStats {
            buckets: data.len(),
            entries: data.values().map(BTreeMap::len).sum(),
            log_bytes: self.inner.log.lock().size()?,
            commits: self.inner.commits.load(Ordering::Relaxed),
        })
    }

    /// Rewrites the commit log as a single snapshot record.
    ///
    /// Directory-backed stores write the snapshot to a temporary file and
    /// rename it over the live log, so a crash leaves either the old or the
    /// new log. Other backends are truncated and rewritten in place.
    pub fn compact(&self) -> StoreResult<StoreStats> {
        let _writer = self.inner.write_lock.lock();

        let snapshot = {
            let data = self.inner.data.read();
            let mut buckets: Vec<&String> = data.keys().collect();
            buckets.sort();
            let mut mutations = Vec::new();
            for bucket in buckets {
                for (key, value) in &data[bucket] {
                    mutations.push(Mutation::Put {
                        bucket: bucket.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
            LogRecord::snapshot(mutations)
        };
        let bytes = snapshot.encode()?;

        let mut log = self.inner.log.lock();
        let before = log.size()?;
        match &self.inner.dir {
            Some(dir) => {
                let mut staged = FileBackend::create(&dir.compact_path())?;
                staged.append(&bytes)?;
                staged.sync()?;
                drop(staged);
                dir.install_compacted()?;
                *log = Box::new(FileBackend::open(&dir.log_path())?);
            }
            None => {
                log.truncate(0)?;
                log.append(&bytes)?;
                log.sync()?;
            }
        }
        let after = log.size()?;
        drop(log);

        info!(
            before_bytes = before,
            after_bytes = after,
            entries = snapshot.mutations.len(),
            "compacted commit log"
        );
        self.stats()
    }
}

impl std::fmt::Debug for MapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapStore")
            .field("dir", &self.dir())
            .field("commits", &self.inner.commits.load(Ordering::Relaxed))
            .finish()
    }
}

fn apply(data: &mut Buckets, record: &LogRecord) {
    if record.kind == RecordKind::Snapshot {
        data.clear();
    }
    for mutation in &record.mutations {
        match mutation {
            Mutation::Put { bucket, key, value } => {
                data.entry(bucket.clone())
                    .or_default()
                    .insert(key.clone(), value.clone());
            }
            Mutation::Delete { bucket, key } => {
                if let Some(entries) = data.get_mut(bucket) {
                    entries.remove(key);
                    if entries.is_empty() {
                        data.remove(bucket);
                    }
                }
            }
        }
    }
}

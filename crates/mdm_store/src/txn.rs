//! Write transactions.

use crate::codec;
use crate::error::StoreResult;
use crate::log::Mutation;
use crate::store::StoreInner;
use parking_lot::MutexGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// A pending write in a transaction.
#[derive(Debug, Clone)]
enum PendingWrite {
    Put(Vec<u8>),
    Delete,
}

/// A write transaction.
///
/// The transaction holds the store's writer lock for its whole lifetime, so a
/// read-modify-write done through one transaction cannot interleave with
/// another writer. Writes become durable and visible on [`commit`]; dropping
/// the transaction discards them.
///
/// [`commit`]: Transaction::commit
pub struct Transaction<'a> {
    store: &'a StoreInner,
    _guard: MutexGuard<'a, ()>,
    writes: BTreeMap<(String, String), PendingWrite>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(store: &'a StoreInner, guard: MutexGuard<'a, ()>) -> Self {
        Self {
            store,
            _guard: guard,
            writes: BTreeMap::new(),
        }
    }

    /// Reads an entry, observing this transaction's own writes.
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        match self.writes.get(&(bucket.to_string(), key.to_string())) {
            Some(PendingWrite::Put(value)) => Some(value.clone()),
            Some(PendingWrite::Delete) => None,
            None => self.store.get(bucket, key),
        }
    }

    /// Reads and decodes an entry.
    pub fn get_typed<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> StoreResult<Option<T>> {
        self.get(bucket, key)
            .map(|bytes| codec::decode(&bytes))
            .transpose()
    }

    /// Lists a bucket in key order, observing this transaction's own writes.
    pub fn list(&self, bucket: &str) -> Vec<(String, Vec<u8>)> {
        let mut entries: BTreeMap<String, Vec<u8>> = self.store.list(bucket).into_iter().collect();
        for ((b, key), write) in &self.writes {
            if b != bucket {
                continue;
            }
            match write {
                PendingWrite::Put(value) => {
                    entries.insert(key.clone(), value.clone());
                }
                PendingWrite::Delete => {
                    entries.remove(key);
                }
            }
        }
        entries.into_iter().collect()
    }

    /// Stages an insert or replace.
    pub fn put(&mut self, bucket: &str, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.writes.insert(
            (bucket.to_string(), key.to_string()),
            PendingWrite::Put(value),
        );
        Ok(())
    }

    /// Encodes and stages a value.
    pub fn put_typed<T: Serialize + ?Sized>(
        &mut self,
        bucket: &str,
        key: &str,
        value: &T,
    ) -> StoreResult<()> {
        let bytes = codec::encode(value)?;
        self.put(bucket, key, bytes)
    }

    /// Stages a delete. Deleting a missing entry is not an error.
    pub fn delete(&mut self, bucket: &str, key: &str) -> StoreResult<()> {
        self.writes
            .insert((bucket.to_string(), key.to_string()), PendingWrite::Delete);
        Ok(())
    }

    /// Returns true if nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commits the staged writes as one log record.
    ///
    /// A transaction with no writes commits without touching the log.
    pub fn commit(self) -> StoreResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let mutations = self
            .writes
            .into_iter()
            .map(|((bucket, key), write)| match write {
                PendingWrite::Put(value) => Mutation::Put { bucket, key, value },
                PendingWrite::Delete => Mutation::Delete { bucket, key },
            })
            .collect();

        self.store.commit(mutations)
    }

    /// Discards the staged writes.
    pub fn abort(self) {}
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("writes", &self.writes.len())
            .finish()
    }
}

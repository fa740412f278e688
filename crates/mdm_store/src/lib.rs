//! # MDM Store
//!
//! Durable map store for the MDM core.
//!
//! The store keeps named **buckets** of `String -> bytes` entries in memory and
//! makes every committed transaction durable by appending one framed record to
//! a commit log before the change becomes visible.
//!
//! ## Design
//!
//! - Backends are opaque byte logs (read, append, sync, truncate)
//! - One writer at a time: [`MapStore::begin`] holds the writer lock until the
//!   transaction is committed or dropped
//! - Reads inside a transaction observe the transaction's own writes
//! - The log is replayed on open; a torn final record is discarded
//! - [`MapStore::compact`] rewrites the log as a single snapshot record
//!
//! ## Example
//!
//! ```rust
//! use mdm_store::{MapStore, StoreError};
//!
//! let store = MapStore::open_in_memory();
//! store
//!     .transaction(|txn| {
//!         txn.put("devices", "ABCD", b"hello".to_vec())?;
//!         Ok::<_, StoreError>(())
//!     })
//!     .unwrap();
//! assert_eq!(store.get("devices", "ABCD").unwrap(), b"hello".to_vec());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod codec;
mod dir;
mod error;
mod file;
mod log;
mod memory;
mod store;
mod txn;

pub use backend::StorageBackend;
pub use codec::{decode, encode};
pub use dir::StoreDir;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use log::{compute_crc32, LogRecord, Mutation, RecordKind, LOG_MAGIC, LOG_VERSION};
pub use memory::InMemoryBackend;
pub use store::{MapStore, StoreStats};
pub use txn::Transaction;

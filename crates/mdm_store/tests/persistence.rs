//! On-disk behavior of the map store.

use mdm_store::{MapStore, StoreError, StoreResult};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    name: String,
    items: Vec<String>,
}

#[test]
fn committed_values_survive_reopen() {
    let dir = tempdir().unwrap();

    {
        let store = MapStore::open(dir.path()).unwrap();
        store
            .transaction(|txn| {
                txn.put_typed(
                    "records",
                    "one",
                    &Record {
                        name: "one".into(),
                        items: vec!["a".into()],
                    },
                )?;
                txn.put("raw", "blob", vec![1, 2, 3])
            })
            .unwrap();
    }

    let store = MapStore::open(dir.path()).unwrap();
    let record: Record = store.get_typed("records", "one").unwrap().unwrap();
    assert_eq!(record.items, vec!["a".to_string()]);
    assert_eq!(store.get("raw", "blob"), Some(vec![1, 2, 3]));
    assert_eq!(store.buckets(), vec!["raw".to_string(), "records".to_string()]);
}

#[test]
fn open_store_holds_directory_lock() {
    let dir = tempdir().unwrap();
    let _store = MapStore::open(dir.path()).unwrap();
    assert!(matches!(MapStore::open(dir.path()), Err(StoreError::Locked)));
}

#[test]
fn compaction_through_directory_survives_reopen() {
    let dir = tempdir().unwrap();

    {
        let store = MapStore::open(dir.path()).unwrap();
        for i in 0..50u32 {
            store
                .transaction(|txn| txn.put_typed("counters", "c", &i))
                .unwrap();
        }
        store.transaction(|txn| txn.put("other", "x", vec![9])).unwrap();

        let before = store.stats().unwrap().log_bytes;
        let after = store.compact().unwrap();
        assert!(after.log_bytes < before);
        assert_eq!(after.entries, 2);

        // Writes after compaction land in the new log.
        store.transaction(|txn| txn.put("other", "y", vec![8])).unwrap();
    }

    let store = MapStore::open(dir.path()).unwrap();
    let counter: u32 = store.get_typed("counters", "c").unwrap().unwrap();
    assert_eq!(counter, 49);
    assert_eq!(store.get("other", "y"), Some(vec![8]));
    assert!(!dir.path().join("store.log.tmp").exists());
}

#[test]
fn corrupted_log_is_reported() {
    let dir = tempdir().unwrap();
    {
        let store = MapStore::open(dir.path()).unwrap();
        store.transaction(|txn| txn.put("b", "k", vec![1; 16])).unwrap();
    }

    let log_path = dir.path().join("store.log");
    let mut bytes = std::fs::read(&log_path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xff;
    std::fs::write(&log_path, bytes).unwrap();

    let result = MapStore::open(dir.path());
    assert!(matches!(
        result,
        Err(StoreError::ChecksumMismatch { .. }) | Err(StoreError::Corrupted { .. })
    ));
}

#[derive(Debug, Clone)]
enum Op {
    Put(String, u8),
    Delete(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(String::from);
    prop_oneof![
        (key.clone(), any::<u8>()).prop_map(|(k, v)| Op::Put(k, v)),
        key.prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn reopen_matches_model(batches in prop::collection::vec(prop::collection::vec(op_strategy(), 1..5), 1..10)) {
        let dir = tempdir().unwrap();
        let mut model: BTreeMap<String, Vec<u8>> = BTreeMap::new();

        {
            let store = MapStore::open(dir.path()).unwrap();
            for batch in &batches {
                store.transaction(|txn| {
                    for op in batch {
                        match op {
                            Op::Put(k, v) => txn.put("bucket", k, vec![*v])?,
                            Op::Delete(k) => txn.delete("bucket", k)?,
                        }
                    }
                    StoreResult::Ok(())
                }).unwrap();
                for op in batch {
                    match op {
                        Op::Put(k, v) => { model.insert(k.clone(), vec![*v]); }
                        Op::Delete(k) => { model.remove(k); }
                    }
                }
            }
        }

        let store = MapStore::open(dir.path()).unwrap();
        let actual: BTreeMap<String, Vec<u8>> = store.list("bucket").into_iter().collect();
        prop_assert_eq!(actual, model);
    }
}

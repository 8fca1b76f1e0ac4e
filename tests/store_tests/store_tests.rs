//! Tests for the in-memory key-value store

use std::sync::Arc;
use std::thread;

use txlog::{KvStore, TxLogError};

#[test]
fn test_put_get() {
    let store = KvStore::new();
    store.put("key1", "value1").unwrap();

    assert_eq!(store.get("key1").unwrap(), "value1");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_missing_key() {
    let store = KvStore::new();
    assert!(store.is_empty());
    assert!(matches!(store.get("nope"), Err(TxLogError::KeyNotFound)));
}

#[test]
fn test_overwrite() {
    let store = KvStore::new();
    store.put("k", "v1").unwrap();
    store.put("k", "v2").unwrap();

    assert_eq!(store.get("k").unwrap(), "v2");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_delete() {
    let store = KvStore::new();
    store.put("k", "v").unwrap();
    store.delete("k").unwrap();

    assert!(matches!(store.get("k"), Err(TxLogError::KeyNotFound)));
    // Deleting an absent key is fine
    store.delete("k").unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_snapshot_is_sorted_copy() {
    let store = KvStore::new();
    store.put("b", "2").unwrap();
    store.put("a", "1").unwrap();

    let snapshot = store.snapshot();
    store.put("c", "3").unwrap();

    assert_eq!(
        snapshot.into_iter().collect::<Vec<_>>(),
        vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]
    );
    assert_eq!(store.len(), 3);
}

#[test]
fn test_concurrent_writers_and_readers() {
    let store = Arc::new(KvStore::new());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..250 {
                    let key = format!("t{}-{}", t, i);
                    store.put(&key, &i.to_string()).unwrap();
                    assert_eq!(store.get(&key).unwrap(), i.to_string());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 1000);
}

//! Key-Value Store
//!
//! In-memory map rebuilt from the transaction log at startup.
//!
//! ## Concurrency
//! `RwLock` around a `HashMap`: many concurrent readers, one writer, no
//! reentrant acquisition. Mutation only through `put` / `delete`.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::error::{Result, TxLogError};

/// Thread-safe string map
#[derive(Debug, Default)]
pub struct KvStore {
    data: RwLock<HashMap<String, String>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Get a value, `KeyNotFound` if absent
    pub fn get(&self, key: &str) -> Result<String> {
        self.data
            .read()
            .get(key)
            .cloned()
            .ok_or(TxLogError::KeyNotFound)
    }

    /// Remove a key; removing an absent key is not an error
    pub fn delete(&self, key: &str) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Sorted copy of the contents
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

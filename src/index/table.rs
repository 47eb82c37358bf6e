//! Index implementation
//!
//! HashMap-based index with RwLock for concurrency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::wal::{LogRecord, Operation};

use super::KeySet;

/// Key → value map rebuilt from the log
///
/// ## Concurrency:
/// - `data`: RwLock (many concurrent readers, exclusive writer)
/// - `size`: approximate bytes of keys + values, maintained under the write lock
pub struct Index {
    data: RwLock<HashMap<String, String>>,
    size: AtomicUsize,
}

impl Index {
    /// Create a new empty index
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Build an index by folding records in order
    ///
    /// Used to inspect a log without opening it for writing, e.g. by the
    /// CLI's `verify` over a [`Replay`](crate::wal::Replay).
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let index = Self::new();
        for record in records {
            index.apply(&record.operation);
        }
        index
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Look up several keys under one read lock, in request order
    pub fn multi_get<K: AsRef<str>>(&self, keys: &[K]) -> Vec<(String, Option<String>)> {
        let data = self.data.read();
        keys.iter()
            .map(|key| {
                let key = key.as_ref();
                (key.to_string(), data.get(key).cloned())
            })
            .collect()
    }

    /// Apply one operation (write lock)
    pub fn apply(&self, operation: &Operation) {
        let mut data = self.data.write();
        self.apply_locked(&mut data, operation);
    }

    /// Apply a batch of operations under a single write lock, so readers see
    /// either none or all of it
    pub fn apply_batch(&self, operations: &[Operation]) {
        let mut data = self.data.write();
        for operation in operations {
            self.apply_locked(&mut data, operation);
        }
    }

    fn apply_locked(&self, data: &mut HashMap<String, String>, operation: &Operation) {
        match operation {
            Operation::Set { key, value } => {
                let added = key.len() + value.len();
                match data.insert(key.clone(), value.clone()) {
                    Some(old) => {
                        self.size.fetch_add(value.len(), Ordering::Relaxed);
                        self.size.fetch_sub(old.len(), Ordering::Relaxed);
                    }
                    None => {
                        self.size.fetch_add(added, Ordering::Relaxed);
                    }
                }
            }
            Operation::Remove { key } => {
                if let Some(old) = data.remove(key) {
                    self.size.fetch_sub(key.len() + old.len(), Ordering::Relaxed);
                }
            }
            Operation::Clear => {
                data.clear();
                self.size.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Approximate size of keys and values in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Keys present right now
    pub fn keys(&self) -> KeySet {
        KeySet::new(self.data.read().keys().cloned().collect())
    }

    /// Copy of every live entry, for compaction
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

//! Index Module
//!
//! In-memory view of the store that serves every read.
//!
//! ## Responsibilities
//! - O(1) point lookups
//! - Single-writer/multi-reader access pattern
//! - Apply log operations, one at a time or as an atomic batch
//! - Snapshots for enumeration and compaction
//!
//! ## Data Structure Choice
//! HashMap wrapped in RwLock:
//! - Reads only ever need point lookups or a full scan, never key order
//! - The index is a cache over the log and is rebuilt from it on open

mod table;

use std::sync::Arc;

pub use table::Index;

/// Keys present in the store at the moment of the call
///
/// Cheap to clone. Iterating never touches the live index, so a `KeySet` can
/// be walked any number of times and always yields the same keys. Order is
/// unspecified.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Arc<[String]>,
}

impl KeySet {
    pub(crate) fn new(keys: Vec<String>) -> Self {
        Self { keys: keys.into() }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Copy the keys out, sorted
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut keys = self.keys.to_vec();
        keys.sort_unstable();
        keys
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

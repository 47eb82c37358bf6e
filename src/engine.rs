//! Engine Module
//!
//! The storage engine that coordinates the log and the index.
//!
//! ## Responsibilities
//! - Recover the index from the log on open
//! - Own the write path: append to the log, then apply to the index
//! - Serve reads from the index
//! - Compact the log, automatically or on request

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{BurrowError, Result};
use crate::index::{Index, KeySet};
use crate::merge;
use crate::wal::{LogManager, Operation, RecoveryReport};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (set/remove/clear/batches/merge): serialized by the `log`
///   mutex, which is held across "append to log + apply to index". Batches
///   and `merge_item` hold it for their whole duration.
///
/// - **Reads** (get/multi_get/all_keys): only take the index read lock, so
///   they run concurrently with each other and see the state before or after
///   any write, never part of one.
///
/// - **Compaction**: takes the `log` mutex to start and to finish; the new
///   segment is written in between without blocking writers.
///
/// Dropping an engine that was not closed syncs the log and logs any error;
/// call [`Engine::close`] to see that error instead.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory holding this store's manifest and segments
    store_dir: PathBuf,

    /// Write-ahead log. Its mutex is the single writer role.
    log: Mutex<LogManager>,

    /// Read-side view of the log (internal RwLock)
    index: Index,

    /// One compaction at a time
    compaction_lock: Mutex<()>,

    /// Cleared by `close`
    open: AtomicBool,

    /// What the startup replay found
    recovery: RecoveryReport,
}

/// Point-in-time counters for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub keys: usize,
    pub index_bytes: usize,
    pub segments: usize,
    pub active_segment_bytes: u64,
    pub last_sequence: u64,
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// Startup runs in two phases:
    /// 1. Recover: replay every live segment into a fresh index, truncating a
    ///    torn or corrupt tail
    /// 2. Ready: accept reads and writes
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store_dir = config.store_dir();
        let index = Index::new();

        let (log, recovery) =
            LogManager::open(&store_dir, &config, |record| index.apply(&record.operation))?;

        if recovery.was_truncated {
            tracing::warn!(
                store = %config.store_id,
                recovered = recovery.records_recovered,
                corrupted = recovery.records_corrupted,
                truncated_bytes = recovery.truncated_bytes,
                dropped_segments = ?recovery.dropped_segments,
                last_sequence = recovery.last_sequence,
                "log tail was damaged and has been truncated"
            );
        }

        tracing::info!(
            store = %config.store_id,
            dir = %store_dir.display(),
            keys = index.len(),
            segments = log.segment_count(),
            records = recovery.records_recovered,
            "store opened"
        );

        Ok(Self {
            config,
            store_dir,
            log: Mutex::new(log),
            index,
            compaction_lock: Mutex::new(()),
            open: AtomicBool::new(true),
            recovery,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        Ok(self.index.get(key))
    }

    /// Get several values at once, in request order
    ///
    /// Absent keys come back as `None`.
    pub fn multi_get<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<(String, Option<String>)>> {
        self.ensure_open()?;
        Ok(self.index.multi_get(keys))
    }

    /// Every key currently present (order unspecified)
    pub fn all_keys(&self) -> Result<KeySet> {
        self.ensure_open()?;
        Ok(self.index.keys())
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.index.contains(key))
    }

    /// Number of keys present
    pub fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.index.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.index.is_empty())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set a key to a value, overwriting any previous value
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.commit(vec![Operation::Set {
            key: key.to_string(),
            value: value.to_string(),
        }])
    }

    /// Remove a key. Removing an absent key succeeds.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.commit(vec![Operation::Remove {
            key: key.to_string(),
        }])
    }

    /// Remove every key
    pub fn clear(&self) -> Result<()> {
        self.commit(vec![Operation::Clear])
    }

    /// Set several keys as one atomic step
    pub fn multi_set<K, V>(&self, pairs: &[(K, V)]) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let operations = pairs
            .iter()
            .map(|(key, value)| Operation::Set {
                key: key.as_ref().to_string(),
                value: value.as_ref().to_string(),
            })
            .collect();
        self.commit(operations)
    }

    /// Remove several keys as one atomic step
    pub fn multi_remove<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        let operations = keys
            .iter()
            .map(|key| Operation::Remove {
                key: key.as_ref().to_string(),
            })
            .collect();
        self.commit(operations)
    }

    /// Merge `delta` into the value stored at `key` and return the result
    ///
    /// With no existing value this behaves as `set`. Otherwise both values
    /// must be JSON objects; see [`crate::merge`].
    pub fn merge_item(&self, key: &str, delta: &str) -> Result<String> {
        let merged = {
            let mut log = self.log.lock();
            self.ensure_open()?;

            let merged = match self.index.get(key) {
                Some(existing) => merge::merge_json(&existing, delta)?,
                None => delta.to_string(),
            };

            let operation = Operation::Set {
                key: key.to_string(),
                value: merged.clone(),
            };
            log.append(&operation)?;
            self.index.apply(&operation);
            merged
        };

        self.maybe_compact();
        Ok(merged)
    }

    /// Append `operations` and apply them to the index under the writer lock
    fn commit(&self, operations: Vec<Operation>) -> Result<()> {
        if operations.is_empty() {
            return self.ensure_open();
        }

        {
            let mut log = self.log.lock();
            self.ensure_open()?;

            if let [operation] = operations.as_slice() {
                let sequence = log.append(operation)?;
                tracing::trace!(sequence, "record committed");
            } else {
                let sequences = log.append_batch(&operations)?;
                tracing::trace!(
                    first = sequences.first().copied(),
                    count = sequences.len(),
                    "batch committed"
                );
            }

            self.index.apply_batch(&operations);
        }

        self.maybe_compact();
        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rewrite the log so it holds only the live keys
    ///
    /// Reads and writes continue while the new segment is written.
    pub fn compact(&self) -> Result<()> {
        self.ensure_open()?;
        let _compaction = self.compaction_lock.lock();
        self.compact_locked()
    }

    /// Compact if the live segment count crossed the threshold and no other
    /// compaction is running. Failures are logged, not returned: the write
    /// that triggered this has already succeeded.
    fn maybe_compact(&self) {
        let threshold = self.config.compaction_segment_threshold;
        if threshold == 0 || self.log.lock().segment_count() <= threshold {
            return;
        }

        let Some(_compaction) = self.compaction_lock.try_lock() else {
            return;
        };
        if let Err(e) = self.compact_locked() {
            tracing::warn!(store = %self.config.store_id, error = %e, "automatic compaction failed");
        }
    }

    /// Caller holds `compaction_lock`
    fn compact_locked(&self) -> Result<()> {
        let (ticket, snapshot) = {
            let mut log = self.log.lock();
            self.ensure_open()?;
            let ticket = log.begin_compaction()?;
            (ticket, self.index.snapshot())
        };

        tracing::debug!(
            segment = ticket.segment_id(),
            sequence = ticket.sequence(),
            keys = snapshot.len(),
            retiring = ticket.retired().len(),
            "compaction started"
        );

        let written = match ticket.write(snapshot) {
            Ok(written) => written,
            Err(e) => {
                self.log.lock().abort_compaction();
                return Err(e);
            }
        };

        self.log.lock().finish_compaction(written)
    }

    /// Force all appended records to disk
    pub fn sync(&self) -> Result<()> {
        let mut log = self.log.lock();
        self.ensure_open()?;
        log.sync()
    }

    /// Close the engine
    ///
    /// Waits for a running compaction to finish, then syncs the log; every
    /// later call fails with `NotOpen`. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _compaction = self.compaction_lock.lock();
        let mut log = self.log.lock();
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        log.sync()?;
        tracing::info!(store = %self.config.store_id, "store closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BurrowError::NotOpen)
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the store directory path
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// What the startup replay recovered and discarded
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Live segment ids, oldest first
    pub fn segment_ids(&self) -> Vec<u64> {
        self.log.lock().segment_ids().to_vec()
    }

    /// Check the on-disk log without modifying it
    pub fn verify(&self) -> Result<RecoveryReport> {
        self.log.lock().verify()
    }

    pub fn stats(&self) -> EngineStats {
        let log = self.log.lock();
        EngineStats {
            keys: self.index.len(),
            index_bytes: self.index.size(),
            segments: log.segment_count(),
            active_segment_bytes: log.active_segment_size(),
            last_sequence: log.last_sequence(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.log.get_mut().sync() {
            tracing::error!(store = %self.config.store_id, error = %e, "failed to sync log on drop");
        }
    }
}

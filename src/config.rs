//! Configuration for BurrowKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{BurrowError, Result};

/// Main configuration for a BurrowKV store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory under which stores live
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {store_id}/
    ///           ├── MANIFEST
    ///           └── segment-<n>.log
    pub data_dir: PathBuf,

    /// Name of the store inside `data_dir`
    pub store_id: String,

    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the active segment
    pub sync_strategy: SyncStrategy,

    /// Size in bytes at which the active segment is sealed and a new one started
    pub segment_size_limit: u64,

    /// Compact automatically once more than this many segments are live.
    /// Zero disables automatic compaction.
    pub compaction_segment_threshold: usize,
}

/// Log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced records. A crash can lose up to N-1
    /// acknowledged writes.
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./burrowkv_data"),
            store_id: "default".to_string(),
            sync_strategy: SyncStrategy::EveryWrite,
            segment_size_limit: 4 * 1024 * 1024, // 4 MB
            compaction_segment_threshold: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding this store's manifest and segments
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join(&self.store_id)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.store_id.is_empty() || self.store_id == "." || self.store_id == ".." {
            return Err(BurrowError::Config(format!(
                "invalid store id: {:?}",
                self.store_id
            )));
        }

        let valid_chars = self
            .store_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid_chars {
            return Err(BurrowError::Config(format!(
                "store id {:?} may only contain [A-Za-z0-9_.-]",
                self.store_id
            )));
        }

        if self.segment_size_limit == 0 {
            return Err(BurrowError::Config(
                "segment_size_limit must be greater than zero".to_string(),
            ));
        }

        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(BurrowError::Config(
                "EveryNEntries count must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all stores)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the store id (subdirectory of the data directory)
    pub fn store_id(mut self, id: impl Into<String>) -> Self {
        self.config.store_id = id.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the segment rotation size (in bytes)
    pub fn segment_size_limit(mut self, size: u64) -> Self {
        self.config.segment_size_limit = size;
        self
    }

    /// Set the live segment count that triggers automatic compaction
    pub fn compaction_segment_threshold(mut self, count: usize) -> Self {
        self.config.compaction_segment_threshold = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

//! Manifest
//!
//! Records which segments are live, in log order, and the counters that must
//! survive a restart. Updates are atomic: the new manifest is written to
//! `MANIFEST.tmp`, synced, then renamed over `MANIFEST`. The rename is the
//! commit point: once it succeeds the new manifest is the one on disk, even
//! if syncing the directory afterwards fails.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result};

use super::segment::sync_dir;

pub const MANIFEST_FILENAME: &str = "MANIFEST";
pub const MANIFEST_TEMP_FILENAME: &str = "MANIFEST.tmp";

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,

    /// Live segment ids, oldest first
    pub segments: Vec<u64>,

    /// Lower bound for the next sequence number to assign
    pub next_sequence: u64,

    /// Next id to use for a new segment file
    pub next_segment_id: u64,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            segments: Vec::new(),
            next_sequence: 1,
            next_segment_id: 1,
        }
    }
}

/// A manifest update that did not fully complete
#[derive(Debug)]
pub enum StoreError {
    /// The previous manifest is still in place
    NotInstalled(io::Error),

    /// The new manifest replaced the previous one, but the directory sync
    /// failed. Callers must treat the update as committed.
    Unsynced(io::Error),
}

impl From<StoreError> for BurrowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotInstalled(e) => BurrowError::write_failed("manifest update", e),
            StoreError::Unsynced(e) => BurrowError::write_failed("manifest directory sync", e),
        }
    }
}

impl Manifest {
    /// Load the manifest from `dir`, `Ok(None)` if there is none yet
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILENAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| BurrowError::Manifest(format!("{}: {}", path.display(), e)))?;

        if manifest.version != MANIFEST_VERSION {
            return Err(BurrowError::Manifest(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }

        Ok(Some(manifest))
    }

    /// Rebuild a manifest from the segment files present in a directory
    pub fn from_segments(mut segments: Vec<u64>) -> Self {
        segments.sort_unstable();
        let next_segment_id = segments.last().map_or(1, |&id| id + 1);
        Self {
            segments,
            next_segment_id,
            ..Self::default()
        }
    }

    /// Atomically replace the manifest in `dir`
    pub fn store(&self, dir: &Path) -> std::result::Result<(), StoreError> {
        let temp_path = dir.join(MANIFEST_TEMP_FILENAME);
        self.write_temp(&temp_path)
            .and_then(|_| fs::rename(&temp_path, dir.join(MANIFEST_FILENAME)))
            .map_err(StoreError::NotInstalled)?;

        sync_dir(dir).map_err(StoreError::Unsynced)
    }

    fn write_temp(&self, temp_path: &Path) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        let mut file = File::create(temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()
    }

    /// Reserve a fresh segment id
    pub fn allocate_segment_id(&mut self) -> u64 {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        id
    }
}

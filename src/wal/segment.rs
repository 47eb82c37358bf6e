//! Segment Writer
//!
//! Handles appending frames to one segment file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::error::{BurrowError, Result};

/// Appends encoded frames to a single segment file
///
/// The writer tracks the committed length of the file. A failed append is
/// rolled back by truncating the file to that length, so a partially written
/// frame is never left in front of later appends. If the rollback itself
/// fails the writer is poisoned and refuses every later append; recovery
/// truncates the leftover bytes on the next open.
pub struct SegmentWriter {
    id: u64,
    path: PathBuf,
    file: File,
    len: u64,
    sync_strategy: SyncStrategy,
    uncommitted_count: usize,
    poisoned: bool,
}

impl SegmentWriter {
    /// Create a new, empty segment file
    pub fn create(dir: &Path, id: u64, sync_strategy: SyncStrategy) -> Result<Self> {
        let path = segment_path(dir, id);
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| BurrowError::write_failed("create segment", e))?;
        file.sync_all()
            .map_err(|e| BurrowError::write_failed("sync new segment", e))?;

        Ok(Self {
            id,
            path,
            file,
            len: 0,
            sync_strategy,
            uncommitted_count: 0,
            poisoned: false,
        })
    }

    /// Open an existing segment for appending at its current end
    pub fn open(dir: &Path, id: u64, sync_strategy: SyncStrategy) -> Result<Self> {
        let path = segment_path(dir, id);
        let file = OpenOptions::new().append(true).open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            id,
            path,
            file,
            len,
            sync_strategy,
            uncommitted_count: 0,
            poisoned: false,
        })
    }

    /// Append one or more encoded frames holding `records` records
    pub fn append(&mut self, frames: &[u8], records: usize) -> Result<()> {
        if self.poisoned {
            return Err(BurrowError::WriteFailed(format!(
                "segment {} holds bytes from a failed append that could not be rolled back",
                self.id
            )));
        }

        let committed = self.len;

        if let Err(e) = self.write_frames(frames, records) {
            self.rollback(committed);
            return Err(BurrowError::write_failed("append to segment", e));
        }

        self.len += frames.len() as u64;
        Ok(())
    }

    fn write_frames(&mut self, frames: &[u8], records: usize) -> io::Result<()> {
        self.file.write_all(frames)?;

        let pending = self.uncommitted_count + records;
        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => pending >= count,
        };
        if due {
            self.file.sync_data()?;
            self.uncommitted_count = 0;
        } else {
            self.uncommitted_count = pending;
        }

        Ok(())
    }

    fn rollback(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len).and_then(|_| self.file.sync_data()) {
            tracing::error!(
                segment = self.id,
                error = %e,
                "failed to roll back segment after write error"
            );
            self.poisoned = true;
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| BurrowError::write_failed("sync segment", e))?;
        self.uncommitted_count = 0;
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Committed length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Records written since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted_count
    }

    /// Whether a failed rollback has left this segment unusable
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

/// "segment-42.log" inside `dir`
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("segment-{}.log", id))
}

/// Parse a segment id from a file name
/// "segment-42.log" → Some(42)
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("segment-")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

/// fsync a directory so renames and creations inside it are durable.
/// Platforms that cannot open directories are skipped.
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    fault::check_dir_sync()?;

    match File::open(dir) {
        Ok(handle) => handle.sync_all(),
        Err(_) => Ok(()),
    }
}

#[cfg(not(test))]
mod fault {
    #[inline]
    pub(super) fn check_dir_sync() -> std::io::Result<()> {
        Ok(())
    }
}

//! Log Compaction
//!
//! Rewrites the live key set into one fresh segment so the segments it
//! replaces can be deleted.
//!
//! ## Phases
//! 1. [`LogManager::begin_compaction`](super::LogManager::begin_compaction),
//!    under the writer lock: reserve the output segment id, seal the active
//!    segment, note the sequence the index snapshot corresponds to.
//! 2. [`CompactionTicket::write`], without any lock: write the snapshot as
//!    `Set` records to `segment-<id>.log.tmp`, sync, rename into place.
//! 3. [`LogManager::finish_compaction`](super::LogManager::finish_compaction),
//!    under the writer lock: swap the retired segments for the new one in the
//!    manifest and delete them. Segments started after phase 1 stay live
//!    behind the compacted segment.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;

use crate::error::{BurrowError, Result};

use super::codec;
use super::segment::{segment_path, sync_dir};
use super::Operation;

/// Flush the encode buffer to the file once it grows past this
const WRITE_CHUNK: usize = 64 * 1024;

/// Everything phase 2 needs, detached from the log manager
#[derive(Debug)]
pub struct CompactionTicket {
    pub(crate) dir: PathBuf,
    pub(crate) segment_id: u64,
    pub(crate) sequence: u64,
    pub(crate) retired: Vec<u64>,
}

/// A compacted segment on disk, not yet part of the live set
#[derive(Debug)]
pub struct CompactedSegment {
    pub(crate) segment_id: u64,
    pub(crate) retired: Vec<u64>,

    /// Number of `Set` records written
    pub records: usize,

    /// Size of the new segment in bytes
    pub bytes: u64,
}

impl CompactionTicket {
    /// Id the compacted segment will be written under
    pub fn segment_id(&self) -> u64 {
        self.segment_id
    }

    /// Sequence number the snapshot must reflect
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Segments the compacted segment replaces
    pub fn retired(&self) -> &[u64] {
        &self.retired
    }

    /// Write `snapshot` as a new segment
    ///
    /// Records take the sequence numbers ending at the snapshot sequence, so
    /// everything appended after the snapshot still sorts after them.
    pub fn write(self, snapshot: Vec<(String, String)>) -> Result<CompactedSegment> {
        let count = snapshot.len() as u64;
        if count > self.sequence {
            return Err(BurrowError::WriteFailed(format!(
                "snapshot of {} keys cannot fit below sequence {}",
                count, self.sequence
            )));
        }

        let final_path = segment_path(&self.dir, self.segment_id);
        let temp_path = temp_path(&final_path);

        match self.write_segment(&temp_path, &final_path, snapshot) {
            Ok(bytes) => Ok(CompactedSegment {
                segment_id: self.segment_id,
                retired: self.retired,
                records: count as usize,
                bytes,
            }),
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    fn write_segment(
        &self,
        temp_path: &Path,
        final_path: &Path,
        snapshot: Vec<(String, String)>,
    ) -> Result<u64> {
        let first_sequence = self.sequence + 1 - snapshot.len() as u64;

        let file = File::create(temp_path)
            .map_err(|e| BurrowError::write_failed("create compacted segment", e))?;
        let mut writer = BufWriter::new(file);
        let mut buf = BytesMut::with_capacity(WRITE_CHUNK);
        let mut written: u64 = 0;

        for (offset, (key, value)) in snapshot.into_iter().enumerate() {
            let operation = Operation::Set { key, value };
            codec::encode_operation_into(first_sequence + offset as u64, &operation, &mut buf)?;

            if buf.len() >= WRITE_CHUNK {
                written += flush_chunk(&mut writer, &mut buf)?;
            }
        }
        written += flush_chunk(&mut writer, &mut buf)?;

        let file = writer
            .into_inner()
            .map_err(|e| BurrowError::write_failed("flush compacted segment", e.into_error()))?;
        file.sync_all()
            .map_err(|e| BurrowError::write_failed("sync compacted segment", e))?;
        drop(file);

        fs::rename(temp_path, final_path)
            .and_then(|_| sync_dir(&self.dir))
            .map_err(|e| BurrowError::write_failed("install compacted segment", e))?;

        Ok(written)
    }
}

fn flush_chunk(writer: &mut BufWriter<File>, buf: &mut BytesMut) -> Result<u64> {
    let len = buf.len() as u64;
    writer
        .write_all(&buf[..])
        .map_err(|e| BurrowError::write_failed("write compacted segment", e))?;
    buf.clear();
    Ok(len)
}

/// "segment-7.log" → "segment-7.log.tmp"
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Remove a compacted segment that never made it into the manifest
pub(crate) fn discard(dir: &Path, segment_id: u64) -> io::Result<()> {
    match fs::remove_file(segment_path(dir, segment_id)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

//! Log Manager
//!
//! Owns the segment set of one store directory.
//!
//! ## Responsibilities
//! - Recover the log on open (truncate a torn tail, drop what follows it)
//! - Assign sequence numbers and append records durably
//! - Rotate the active segment once it reaches the size limit
//! - Swap in compacted segments
//! - Clean up files a crash left behind

use std::fs;
use std::path::{Path, PathBuf};

use bytes::BytesMut;

use crate::config::{Config, SyncStrategy};
use crate::error::{BurrowError, Result};

use super::codec::{self, HEADER_SIZE};
use super::compaction::{self, CompactedSegment, CompactionTicket};
use super::manifest::{Manifest, StoreError, MANIFEST_TEMP_FILENAME};
use super::reader::Replay;
use super::recovery::{LogRecovery, RecoveryReport};
use super::segment::{parse_segment_id, segment_path, SegmentWriter};
use super::{LogRecord, Operation};

/// Append-only log made of numbered segments
///
/// Not internally synchronized: the engine holds it behind its writer lock,
/// and every method that mutates takes `&mut self`.
pub struct LogManager {
    dir: PathBuf,
    manifest: Manifest,
    active: SegmentWriter,
    next_sequence: u64,
    sync_strategy: SyncStrategy,
    segment_size_limit: u64,
    compacting: bool,
}

impl LogManager {
    /// Open or create the log in `dir`
    ///
    /// On startup:
    /// 1. Load the manifest (rebuilt from segment files if missing or unreadable)
    /// 2. Delete files the manifest does not reference
    /// 3. Replay every live segment into `apply`, truncating a damaged tail
    /// 4. Open the last segment for appending, or create the first one
    pub fn open<F>(dir: &Path, config: &Config, apply: F) -> Result<(Self, RecoveryReport)>
    where
        F: FnMut(LogRecord),
    {
        fs::create_dir_all(dir)?;

        let on_disk = Self::discover_segments(dir)?;
        let mut dirty = false;

        let mut manifest = match Manifest::load(dir) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                if !on_disk.is_empty() {
                    tracing::warn!(
                        dir = %dir.display(),
                        segments = on_disk.len(),
                        "manifest missing, rebuilding from segment files"
                    );
                }
                dirty = true;
                Manifest::from_segments(on_disk.clone())
            }
            Err(BurrowError::Manifest(reason)) => {
                tracing::warn!(
                    dir = %dir.display(),
                    %reason,
                    "manifest unreadable, rebuilding from segment files"
                );
                dirty = true;
                Manifest::from_segments(on_disk.clone())
            }
            Err(e) => return Err(e),
        };

        Self::remove_orphans(dir, &manifest, &on_disk);
        if let Some(&max) = on_disk.last() {
            manifest.next_segment_id = manifest.next_segment_id.max(max + 1);
        }

        let report = LogRecovery::recover(dir, &manifest.segments, apply)?;
        if !report.dropped_segments.is_empty() {
            manifest
                .segments
                .retain(|id| !report.dropped_segments.contains(id));
            dirty = true;
        }

        let next_sequence = manifest.next_sequence.max(report.last_sequence + 1);
        if next_sequence != manifest.next_sequence {
            manifest.next_sequence = next_sequence;
            dirty = true;
        }

        let active = match manifest.segments.last() {
            Some(&id) => SegmentWriter::open(dir, id, config.sync_strategy)?,
            None => {
                let id = manifest.allocate_segment_id();
                let writer = SegmentWriter::create(dir, id, config.sync_strategy)?;
                manifest.segments.push(id);
                dirty = true;
                writer
            }
        };

        if dirty {
            manifest.store(dir)?;
        }

        let log = Self {
            dir: dir.to_path_buf(),
            manifest,
            active,
            next_sequence,
            sync_strategy: config.sync_strategy,
            segment_size_limit: config.segment_size_limit,
            compacting: false,
        };

        Ok((log, report))
    }

    /// Append one record, returning its sequence number
    ///
    /// On failure the segment is left as it was and the sequence number is
    /// not consumed.
    pub fn append(&mut self, operation: &Operation) -> Result<u64> {
        self.rotate_if_full()?;

        let sequence = self.next_sequence;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + operation.size_hint());
        codec::encode_operation_into(sequence, operation, &mut buf)?;

        self.active.append(&buf, 1)?;
        self.next_sequence += 1;

        Ok(sequence)
    }

    /// Append a batch as consecutive records with a single write and sync
    ///
    /// Either every record of the batch is committed or none is.
    pub fn append_batch(&mut self, operations: &[Operation]) -> Result<Vec<u64>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        self.rotate_if_full()?;

        let capacity = operations
            .iter()
            .map(|op| HEADER_SIZE + op.size_hint())
            .sum();
        let mut buf = BytesMut::with_capacity(capacity);
        let mut sequences = Vec::with_capacity(operations.len());

        for (offset, operation) in operations.iter().enumerate() {
            let sequence = self.next_sequence + offset as u64;
            codec::encode_operation_into(sequence, operation, &mut buf)?;
            sequences.push(sequence);
        }

        self.active.append(&buf, operations.len())?;
        self.next_sequence += operations.len() as u64;

        Ok(sequences)
    }

    /// Iterate over every record currently in the log
    pub fn replay(&self) -> Replay {
        Replay::new(&self.dir, self.manifest.segments.clone())
    }

    /// Check the log without modifying it
    pub fn verify(&self) -> Result<RecoveryReport> {
        LogRecovery::verify(&self.dir, &self.manifest.segments)
    }

    fn rotate_if_full(&mut self) -> Result<()> {
        if self.active.len() >= self.segment_size_limit {
            self.rotate()?;
        }
        Ok(())
    }

    /// Seal the active segment and start a new one, returning its id
    pub fn rotate(&mut self) -> Result<u64> {
        self.active.sync()?;

        let mut next = self.manifest.clone();
        let id = next.allocate_segment_id();
        let writer = SegmentWriter::create(&self.dir, id, self.sync_strategy)?;
        next.segments.push(id);
        next.next_sequence = self.next_sequence;

        if let Err(e) = next.store(&self.dir) {
            if let StoreError::NotInstalled(_) = e {
                let _ = fs::remove_file(writer.path());
                return Err(e.into());
            }

            // The manifest on disk already lists the new segment
            tracing::warn!(segment = id, error = ?e, "rotated, but manifest directory sync failed");
            self.manifest = next;
            self.active = writer;
            return Err(e.into());
        }

        tracing::debug!(
            sealed = self.active.id(),
            sealed_bytes = self.active.len(),
            segment = id,
            "rotated log segment"
        );

        self.manifest = next;
        self.active = writer;
        Ok(id)
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Phase 1: reserve the output segment and seal the current set
    ///
    /// The caller must snapshot the index before releasing the writer lock;
    /// that snapshot corresponds to `ticket.sequence()`.
    pub fn begin_compaction(&mut self) -> Result<CompactionTicket> {
        if self.compacting {
            return Err(BurrowError::WriteFailed(
                "compaction already in progress".to_string(),
            ));
        }

        let retired = self.manifest.segments.clone();
        let segment_id = self.manifest.allocate_segment_id();
        self.rotate()?;
        self.compacting = true;

        Ok(CompactionTicket {
            dir: self.dir.clone(),
            segment_id,
            sequence: self.next_sequence - 1,
            retired,
        })
    }

    /// Phase 3: make the compacted segment live and delete what it replaces
    pub fn finish_compaction(&mut self, compacted: CompactedSegment) -> Result<()> {
        self.compacting = false;

        let mut next = self.manifest.clone();
        next.segments.retain(|id| !compacted.retired.contains(id));
        next.segments.insert(0, compacted.segment_id);
        next.next_sequence = self.next_sequence;

        if let Err(e) = next.store(&self.dir) {
            if let StoreError::NotInstalled(_) = e {
                if let Err(cleanup) = compaction::discard(&self.dir, compacted.segment_id) {
                    tracing::warn!(error = %cleanup, "failed to remove unused compacted segment");
                }
                return Err(e.into());
            }

            // Installed but maybe not durable. The retired segments stay on
            // disk until the next open removes them as orphans.
            tracing::warn!(
                segment = compacted.segment_id,
                error = ?e,
                "compaction installed, but manifest directory sync failed"
            );
            self.manifest = next;
            return Err(e.into());
        }
        self.manifest = next;

        for &id in &compacted.retired {
            if let Err(e) = fs::remove_file(segment_path(&self.dir, id)) {
                tracing::warn!(segment = id, error = %e, "failed to delete retired segment");
            }
        }

        tracing::info!(
            segment = compacted.segment_id,
            records = compacted.records,
            bytes = compacted.bytes,
            retired = compacted.retired.len(),
            "compaction installed"
        );

        Ok(())
    }

    /// Forget a compaction whose phase 2 failed
    pub fn abort_compaction(&mut self) {
        self.compacting = false;
    }

    /// Force the active segment to disk
    pub fn sync(&mut self) -> Result<()> {
        self.active.sync()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Live segment ids, oldest first
    pub fn segment_ids(&self) -> &[u64] {
        &self.manifest.segments
    }

    pub fn segment_count(&self) -> usize {
        self.manifest.segments.len()
    }

    pub fn active_segment_id(&self) -> u64 {
        self.active.id()
    }

    pub fn active_segment_size(&self) -> u64 {
        self.active.len()
    }

    /// Sequence number the next append will receive
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Highest sequence number assigned so far (0 if none)
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Segment ids present in `dir`, ascending
    fn discover_segments(dir: &Path) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = parse_segment_id(&path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Delete unreferenced segments and leftover temp files
    fn remove_orphans(dir: &Path, manifest: &Manifest, on_disk: &[u64]) {
        for &id in on_disk {
            if !manifest.segments.contains(&id) {
                let path = segment_path(dir, id);
                tracing::warn!(segment = id, "removing segment not referenced by manifest");
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(segment = id, error = %e, "failed to remove orphan segment");
                }
            }
        }

        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| {
                    name == MANIFEST_TEMP_FILENAME
                        || (name.starts_with("segment-") && name.ends_with(".log.tmp"))
                });
            if is_temp {
                tracing::debug!(path = %path.display(), "removing leftover temp file");
                let _ = fs::remove_file(&path);
            }
        }
    }
}

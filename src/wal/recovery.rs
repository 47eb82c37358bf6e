//! Log Recovery
//!
//! Handles crash recovery by replaying the log and cutting off a damaged tail.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use crate::error::{BurrowError, Result};

use super::reader::{Replay, StopCause};
use super::segment::segment_path;
use super::LogRecord;

/// Handles log recovery after a crash
pub struct LogRecovery;

/// Result of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of records successfully replayed
    pub records_recovered: u64,

    /// Number of whole records rejected (checksum, payload or ordering)
    pub records_corrupted: u64,

    /// Last valid sequence number
    pub last_sequence: u64,

    /// Whether the log was cut short (torn write or corruption)
    pub was_truncated: bool,

    /// Bytes discarded from the segment where replay stopped
    pub truncated_bytes: u64,

    /// Segments after the damage point, dropped entirely
    pub dropped_segments: Vec<u64>,
}

impl LogRecovery {
    /// Replay `segments` from `dir`, handing each valid record to `apply`
    ///
    /// This will:
    /// 1. Read all valid records in order
    /// 2. Stop at the first torn or corrupt record
    /// 3. Truncate that segment at the last valid record
    /// 4. Delete any later segment files
    ///
    /// A listed segment that cannot be read at all (missing, permissions,
    /// out of descriptors) is not damage: recovery fails with `Io` and no
    /// file is touched.
    ///
    /// The caller removes `dropped_segments` from its manifest.
    pub fn recover<F>(dir: &Path, segments: &[u64], apply: F) -> Result<RecoveryReport>
    where
        F: FnMut(LogRecord),
    {
        let (report, replay) = Self::scan(dir, segments, apply)?;

        if let Some(stop) = replay.stop() {
            let file = OpenOptions::new()
                .write(true)
                .open(segment_path(dir, stop.segment_id))?;
            file.set_len(stop.offset)?;
            file.sync_all()?;

            for &id in &report.dropped_segments {
                match fs::remove_file(segment_path(dir, id)) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
        }

        Ok(report)
    }

    /// Verify integrity of a log without modifying it
    ///
    /// Fails with `Io` in the same cases as [`LogRecovery::recover`].
    pub fn verify(dir: &Path, segments: &[u64]) -> Result<RecoveryReport> {
        Ok(Self::scan(dir, segments, |_| {})?.0)
    }

    fn scan<F>(dir: &Path, segments: &[u64], mut apply: F) -> Result<(RecoveryReport, Replay)>
    where
        F: FnMut(LogRecord),
    {
        let mut replay = Replay::new(dir, segments.to_vec());
        let mut report = RecoveryReport::default();

        for record in replay.by_ref() {
            report.records_recovered += 1;
            apply(record);
        }
        report.last_sequence = replay.last_sequence();

        if let Some(stop) = replay.stop() {
            if let StopCause::Unreadable { kind, reason } = &stop.cause {
                return Err(BurrowError::Io(io::Error::new(
                    *kind,
                    format!("segment {}: {}", stop.segment_id, reason),
                )));
            }

            report.was_truncated = true;
            report.truncated_bytes = stop.file_len.saturating_sub(stop.offset);
            if matches!(stop.cause, StopCause::Corrupt(_)) {
                report.records_corrupted = 1;
            }
            report.dropped_segments = replay.segments_after_stop().to_vec();
        }

        Ok((report, replay))
    }
}

//! Log Reader
//!
//! Reads records back from segment files, oldest segment first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::BurrowError;

use super::codec::{self, DecodeOutcome};
use super::segment::segment_path;
use super::LogRecord;

/// Reads the records of one segment file
///
/// The whole segment is loaded up front; segments are bounded by the
/// rotation size.
pub struct SegmentReader {
    id: u64,
    data: Vec<u8>,
    offset: usize,
    end: Option<SegmentEnd>,
}

/// Why a segment stopped yielding records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentEnd {
    /// Every byte of the segment was a valid record
    Clean,

    /// The segment ends partway through a record (torn write)
    Incomplete { offset: u64 },

    /// A whole record failed validation
    Corrupt { offset: u64, reason: String },
}

impl SegmentReader {
    /// Open a segment file for reading
    pub fn open(path: &Path, id: u64) -> io::Result<Self> {
        Ok(Self::from_bytes(id, fs::read(path)?))
    }

    pub fn from_bytes(id: u64, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            offset: 0,
            end: None,
        }
    }

    /// Read the next valid record, or `None` once the segment is exhausted
    /// or damaged. See [`SegmentReader::end`] for which.
    pub fn next_record(&mut self) -> Option<LogRecord> {
        if self.end.is_some() {
            return None;
        }

        if self.offset >= self.data.len() {
            self.end = Some(SegmentEnd::Clean);
            return None;
        }

        match codec::decode(&self.data[self.offset..]) {
            Ok(DecodeOutcome::Complete { record, consumed }) => {
                self.offset += consumed;
                Some(record)
            }
            Ok(DecodeOutcome::Incomplete { .. }) => {
                self.end = Some(SegmentEnd::Incomplete {
                    offset: self.offset as u64,
                });
                None
            }
            Err(BurrowError::CorruptRecord(reason)) => {
                self.end = Some(SegmentEnd::Corrupt {
                    offset: self.offset as u64,
                    reason,
                });
                None
            }
            Err(other) => {
                self.end = Some(SegmentEnd::Corrupt {
                    offset: self.offset as u64,
                    reason: other.to_string(),
                });
                None
            }
        }
    }

    /// Mark the segment damaged at the start of the last returned record
    fn reject_last(&mut self, consumed: usize, reason: String) {
        self.offset -= consumed;
        self.end = Some(SegmentEnd::Corrupt {
            offset: self.offset as u64,
            reason,
        });
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Byte offset just past the last valid record read so far
    pub fn valid_len(&self) -> u64 {
        self.offset as u64
    }

    /// Total size of the segment file
    pub fn file_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// How the segment ended, once `next_record` has returned `None`
    pub fn end(&self) -> Option<&SegmentEnd> {
        self.end.as_ref()
    }
}

/// Where and why a replay stopped before the end of the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStop {
    /// Segment holding the first bad byte
    pub segment_id: u64,

    /// Offset of the first bad byte in that segment
    pub offset: u64,

    /// Length of that segment on disk
    pub file_len: u64,

    pub cause: StopCause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCause {
    /// Torn trailing record
    Incomplete,

    /// Checksum, payload or ordering failure
    Corrupt(String),

    /// The segment file could not be read at all
    Unreadable { kind: io::ErrorKind, reason: String },
}

/// Lazy iterator over every record in the log, in sequence order
///
/// Segments are read one at a time as the iterator advances. Iteration stops
/// silently at the first torn or corrupt record; [`Replay::stop`] reports
/// where. A fresh `Replay` always starts again from the oldest segment.
pub struct Replay {
    dir: PathBuf,
    segments: Vec<u64>,
    next_segment: usize,
    current: Option<SegmentReader>,
    last_sequence: u64,
    stop: Option<ReplayStop>,
}

impl Replay {
    pub fn new(dir: &Path, segments: Vec<u64>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            segments,
            next_segment: 0,
            current: None,
            last_sequence: 0,
            stop: None,
        }
    }

    /// Set when replay ended early because of damage
    pub fn stop(&self) -> Option<&ReplayStop> {
        self.stop.as_ref()
    }

    /// Highest sequence yielded so far
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Segments after the one replay stopped in (empty on a clean replay)
    pub fn segments_after_stop(&self) -> &[u64] {
        match self.stop {
            Some(ref stop) => {
                let position = self
                    .segments
                    .iter()
                    .position(|&id| id == stop.segment_id)
                    .map_or(self.segments.len(), |p| p + 1);
                &self.segments[position..]
            }
            None => &[],
        }
    }

    fn open_next_segment(&mut self) -> bool {
        let Some(&id) = self.segments.get(self.next_segment) else {
            return false;
        };
        self.next_segment += 1;

        match SegmentReader::open(&segment_path(&self.dir, id), id) {
            Ok(reader) => {
                self.current = Some(reader);
                true
            }
            Err(e) => {
                self.stop = Some(ReplayStop {
                    segment_id: id,
                    offset: 0,
                    file_len: 0,
                    cause: StopCause::Unreadable {
                        kind: e.kind(),
                        reason: e.to_string(),
                    },
                });
                false
            }
        }
    }
}

impl Iterator for Replay {
    type Item = LogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stop.is_some() {
                return None;
            }

            if self.current.is_none() && !self.open_next_segment() {
                return None;
            }

            let reader = self.current.as_mut()?;
            let before = reader.valid_len();

            if let Some(record) = reader.next_record() {
                if record.sequence <= self.last_sequence {
                    let consumed = (reader.valid_len() - before) as usize;
                    reader.reject_last(
                        consumed,
                        format!(
                            "sequence {} does not follow {}",
                            record.sequence, self.last_sequence
                        ),
                    );
                } else {
                    self.last_sequence = record.sequence;
                    return Some(record);
                }
            }

            let cause = match reader.end() {
                Some(SegmentEnd::Clean) | None => None,
                Some(SegmentEnd::Incomplete { .. }) => Some(StopCause::Incomplete),
                Some(SegmentEnd::Corrupt { reason, .. }) => Some(StopCause::Corrupt(reason.clone())),
            };

            match cause {
                None => self.current = None,
                Some(cause) => {
                    self.stop = Some(ReplayStop {
                        segment_id: reader.id(),
                        offset: reader.valid_len(),
                        file_len: reader.file_len(),
                        cause,
                    });
                    return None;
                }
            }
        }
    }
}

//! Tests for segment writing and reading
//!
//! These tests verify:
//! - Appending frames to a segment
//! - Sync strategies (EveryWrite, EveryNEntries)
//! - Reading records back, including torn and corrupt tails
//! - Replay across several segments

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use burrowkv::config::SyncStrategy;
use burrowkv::wal::{
    encode, segment_path, LogRecord, Operation, Replay, SegmentEnd, SegmentReader, SegmentWriter,
    StopCause,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn record(sequence: u64, key: &str, value: &str) -> LogRecord {
    LogRecord::new(
        sequence,
        Operation::Set {
            key: key.to_string(),
            value: value.to_string(),
        },
    )
}

/// Write `records` into segment `id` through a SegmentWriter
fn write_segment(dir: &Path, id: u64, records: &[LogRecord]) {
    let mut writer = SegmentWriter::create(dir, id, SyncStrategy::EveryWrite).unwrap();
    for r in records {
        writer.append(&encode(r).unwrap(), 1).unwrap();
    }
}

fn read_all(path: &Path, id: u64) -> (Vec<LogRecord>, SegmentReader) {
    let mut reader = SegmentReader::open(path, id).unwrap();
    let mut records = Vec::new();
    while let Some(r) = reader.next_record() {
        records.push(r);
    }
    (records, reader)
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_create_segment_file() {
    let (_temp, dir) = setup_temp_dir();

    let writer = SegmentWriter::create(&dir, 3, SyncStrategy::EveryWrite).unwrap();

    assert_eq!(writer.id(), 3);
    assert_eq!(writer.path(), segment_path(&dir, 3));
    assert!(writer.is_empty());
    assert!(segment_path(&dir, 3).exists());
}

#[test]
fn test_create_refuses_existing_segment() {
    let (_temp, dir) = setup_temp_dir();
    SegmentWriter::create(&dir, 1, SyncStrategy::EveryWrite).unwrap();

    assert!(SegmentWriter::create(&dir, 1, SyncStrategy::EveryWrite).is_err());
}

#[test]
fn test_append_tracks_length() {
    let (_temp, dir) = setup_temp_dir();
    let mut writer = SegmentWriter::create(&dir, 1, SyncStrategy::EveryWrite).unwrap();

    let frame = encode(&record(1, "k", "v")).unwrap();
    writer.append(&frame, 1).unwrap();
    writer.append(&frame, 1).unwrap();

    assert_eq!(writer.len(), 2 * frame.len() as u64);
    assert_eq!(fs::metadata(writer.path()).unwrap().len(), writer.len());
}

#[test]
fn test_reopen_appends_at_end() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[record(1, "a", "1")]);

    let mut writer = SegmentWriter::open(&dir, 1, SyncStrategy::EveryWrite).unwrap();
    writer.append(&encode(&record(2, "b", "2")).unwrap(), 1).unwrap();

    let (records, _) = read_all(&segment_path(&dir, 1), 1);
    assert_eq!(records, vec![record(1, "a", "1"), record(2, "b", "2")]);
}

#[test]
fn test_sync_every_write() {
    let (_temp, dir) = setup_temp_dir();
    let mut writer = SegmentWriter::create(&dir, 1, SyncStrategy::EveryWrite).unwrap();

    writer.append(&encode(&record(1, "k1", "v1")).unwrap(), 1).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(&encode(&record(2, "k2", "v2")).unwrap(), 1).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_sync_every_n_entries() {
    let (_temp, dir) = setup_temp_dir();
    let mut writer =
        SegmentWriter::create(&dir, 1, SyncStrategy::EveryNEntries { count: 3 }).unwrap();

    writer.append(&encode(&record(1, "k", "v")).unwrap(), 1).unwrap();
    assert_eq!(writer.uncommitted_count(), 1);

    writer.append(&encode(&record(2, "k", "v")).unwrap(), 1).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(&encode(&record(3, "k", "v")).unwrap(), 1).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(&encode(&record(4, "k", "v")).unwrap(), 1).unwrap();
    writer.sync().unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_batch_counts_all_records() {
    let (_temp, dir) = setup_temp_dir();
    let mut writer =
        SegmentWriter::create(&dir, 1, SyncStrategy::EveryNEntries { count: 10 }).unwrap();

    let mut frames = encode(&record(1, "a", "1")).unwrap();
    frames.extend(encode(&record(2, "b", "2")).unwrap());
    writer.append(&frames, 2).unwrap();

    assert_eq!(writer.uncommitted_count(), 2);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_read_empty_segment() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[]);

    let (records, reader) = read_all(&segment_path(&dir, 1), 1);

    assert!(records.is_empty());
    assert_eq!(reader.end(), Some(&SegmentEnd::Clean));
}

#[test]
fn test_read_back_in_order() {
    let (_temp, dir) = setup_temp_dir();
    let written: Vec<_> = (1..=20)
        .map(|i| record(i, &format!("key{}", i), &format!("value{}", i)))
        .collect();
    write_segment(&dir, 1, &written);

    let (records, reader) = read_all(&segment_path(&dir, 1), 1);

    assert_eq!(records, written);
    assert_eq!(reader.end(), Some(&SegmentEnd::Clean));
    assert_eq!(reader.valid_len(), reader.file_len());
}

#[test]
fn test_read_stops_at_torn_tail() {
    let (_temp, dir) = setup_temp_dir();
    let good = encode(&record(1, "k", "v")).unwrap();
    let torn = encode(&record(2, "k2", "v2")).unwrap();

    let path = segment_path(&dir, 1);
    let mut bytes = good.clone();
    bytes.extend_from_slice(&torn[..torn.len() - 3]);
    fs::write(&path, &bytes).unwrap();

    let (records, reader) = read_all(&path, 1);

    assert_eq!(records.len(), 1);
    assert_eq!(
        reader.end(),
        Some(&SegmentEnd::Incomplete { offset: good.len() as u64 })
    );
}

#[test]
fn test_read_stops_at_corrupt_record() {
    let (_temp, dir) = setup_temp_dir();
    let good = encode(&record(1, "k", "v")).unwrap();
    let mut bad = encode(&record(2, "k2", "v2")).unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;

    let path = segment_path(&dir, 1);
    let mut bytes = good.clone();
    bytes.extend_from_slice(&bad);
    bytes.extend(encode(&record(3, "k3", "v3")).unwrap());
    fs::write(&path, &bytes).unwrap();

    let (records, reader) = read_all(&path, 1);

    assert_eq!(records, vec![record(1, "k", "v")]);
    assert!(matches!(
        reader.end(),
        Some(SegmentEnd::Corrupt { offset, .. }) if *offset == good.len() as u64
    ));
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_spans_segments_in_order() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[record(1, "a", "1"), record(2, "b", "2")]);
    write_segment(&dir, 2, &[record(3, "c", "3")]);
    write_segment(&dir, 5, &[record(4, "d", "4")]);

    let mut replay = Replay::new(&dir, vec![1, 2, 5]);
    let sequences: Vec<u64> = replay.by_ref().map(|r| r.sequence).collect();

    assert_eq!(sequences, vec![1, 2, 3, 4]);
    assert!(replay.stop().is_none());
    assert_eq!(replay.last_sequence(), 4);
}

#[test]
fn test_replay_is_restartable() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[record(1, "a", "1"), record(2, "b", "2")]);

    let first: Vec<_> = Replay::new(&dir, vec![1]).collect();
    let second: Vec<_> = Replay::new(&dir, vec![1]).collect();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn test_replay_stops_at_torn_tail_in_middle_segment() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[record(1, "a", "1")]);
    write_segment(&dir, 2, &[record(2, "b", "2")]);
    write_segment(&dir, 3, &[record(3, "c", "3")]);

    let mut file = OpenOptions::new().append(true).open(segment_path(&dir, 2)).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();

    let mut replay = Replay::new(&dir, vec![1, 2, 3]);
    let sequences: Vec<u64> = replay.by_ref().map(|r| r.sequence).collect();

    assert_eq!(sequences, vec![1, 2]);
    let stop = replay.stop().unwrap();
    assert_eq!(stop.segment_id, 2);
    assert_eq!(stop.cause, StopCause::Incomplete);
    assert_eq!(stop.file_len - stop.offset, 3);
    assert_eq!(replay.segments_after_stop(), &[3]);
}

#[test]
fn test_replay_rejects_sequence_regression() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[record(1, "a", "1"), record(2, "b", "2")]);
    write_segment(&dir, 2, &[record(2, "stale", "x"), record(3, "c", "3")]);

    let mut replay = Replay::new(&dir, vec![1, 2]);
    let keys: Vec<String> = replay
        .by_ref()
        .map(|r| r.operation.key().unwrap().to_string())
        .collect();

    assert_eq!(keys, vec!["a", "b"]);
    let stop = replay.stop().unwrap();
    assert_eq!(stop.segment_id, 2);
    assert_eq!(stop.offset, 0);
    assert!(matches!(stop.cause, StopCause::Corrupt(_)));
}

#[test]
fn test_replay_missing_segment_is_unreadable() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[record(1, "a", "1")]);

    let mut replay = Replay::new(&dir, vec![1, 2]);
    assert_eq!(replay.by_ref().count(), 1);
    assert!(matches!(
        replay.stop().map(|s| &s.cause),
        Some(StopCause::Unreadable { .. })
    ));
}

//! Tests for log recovery
//!
//! These tests verify:
//! - Recovery from a clean log (no corruption)
//! - Recovery from an empty log
//! - Recovery with partial writes (truncated tail)
//! - Recovery with corrupted records (CRC mismatch)
//! - Later segments dropped after damage
//! - Unreadable or missing segments fail recovery without deleting anything
//! - Verify mode (stats only, no files touched)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use burrowkv::config::SyncStrategy;
use burrowkv::error::BurrowError;
use burrowkv::wal::{encode, segment_path, LogRecord, LogRecovery, Operation, SegmentWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

fn put(sequence: u64, key: &str, value: &str) -> LogRecord {
    LogRecord::new(
        sequence,
        Operation::Set {
            key: key.to_string(),
            value: value.to_string(),
        },
    )
}

/// Write records using SegmentWriter (produces a well-formed segment)
fn write_records_via_writer(dir: &Path, id: u64, first_sequence: u64, count: u64) {
    let mut writer = SegmentWriter::create(dir, id, SyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        let r = put(first_sequence + i, &format!("key{}", i), &format!("value{}", i));
        writer.append(&encode(&r).unwrap(), 1).unwrap();
    }
}

/// Write raw frames directly to a file (for crafting corruption)
fn write_raw(path: &Path, chunks: &[&[u8]]) {
    let mut file = File::create(path).unwrap();
    for chunk in chunks {
        file.write_all(chunk).unwrap();
    }
    file.sync_all().unwrap();
}

fn recover(dir: &Path, segments: &[u64]) -> (Vec<LogRecord>, burrowkv::wal::RecoveryReport) {
    let mut records = Vec::new();
    let report = LogRecovery::recover(dir, segments, |r| records.push(r)).unwrap();
    (records, report)
}

// =============================================================================
// Recover: Clean Log Tests
// =============================================================================

#[test]
fn test_recover_empty_segment() {
    let (_temp, dir) = setup_temp_dir();
    File::create(segment_path(&dir, 1)).unwrap();

    let (records, report) = recover(&dir, &[1]);

    assert!(records.is_empty());
    assert_eq!(report.records_recovered, 0);
    assert_eq!(report.records_corrupted, 0);
    assert_eq!(report.last_sequence, 0);
    assert!(!report.was_truncated);
}

#[test]
fn test_recover_no_segments() {
    let (_temp, dir) = setup_temp_dir();

    let (records, report) = recover(&dir, &[]);

    assert!(records.is_empty());
    assert!(!report.was_truncated);
}

#[test]
fn test_recover_multiple_records() {
    let (_temp, dir) = setup_temp_dir();
    write_records_via_writer(&dir, 1, 1, 10);

    let (records, report) = recover(&dir, &[1]);

    assert_eq!(records.len(), 10);
    assert_eq!(report.records_recovered, 10);
    assert_eq!(report.last_sequence, 10);
    assert!(!report.was_truncated);

    for (i, r) in records.iter().enumerate() {
        assert_eq!(r.sequence, (i + 1) as u64);
    }
}

#[test]
fn test_recover_across_segments() {
    let (_temp, dir) = setup_temp_dir();
    write_records_via_writer(&dir, 1, 1, 5);
    write_records_via_writer(&dir, 2, 6, 5);

    let (records, report) = recover(&dir, &[1, 2]);

    assert_eq!(records.len(), 10);
    assert_eq!(report.last_sequence, 10);
    assert!(report.dropped_segments.is_empty());
}

// =============================================================================
// Recover: Partial Write Tests (was_truncated = true)
// =============================================================================

#[test]
fn test_recover_partial_header_at_tail() {
    let (_temp, dir) = setup_temp_dir();
    let path = segment_path(&dir, 1);
    let good = encode(&put(1, "k", "v")).unwrap();
    write_raw(&path, &[&good, &[0u8; 8]]);

    let (records, report) = recover(&dir, &[1]);

    assert_eq!(records.len(), 1);
    assert_eq!(report.records_recovered, 1);
    assert_eq!(report.records_corrupted, 0);
    assert_eq!(report.last_sequence, 1);
    assert_eq!(report.truncated_bytes, 8);
    assert!(report.was_truncated);

    // The torn bytes are gone from disk
    assert_eq!(fs::metadata(&path).unwrap().len(), good.len() as u64);
}

#[test]
fn test_recover_partial_data_at_tail() {
    let (_temp, dir) = setup_temp_dir();
    let path = segment_path(&dir, 1);
    let good = encode(&put(1, "k", "v")).unwrap();
    let mut bad = encode(&put(2, "k2", "v2")).unwrap();
    bad.truncate(20); // Header is 16 bytes, only 4 bytes of payload
    write_raw(&path, &[&good, &bad]);

    let (records, report) = recover(&dir, &[1]);

    assert_eq!(records.len(), 1);
    assert_eq!(report.truncated_bytes, 20);
    assert!(report.was_truncated);
    assert_eq!(fs::metadata(&path).unwrap().len(), good.len() as u64);
}

#[test]
fn test_recover_twice_is_clean_second_time() {
    let (_temp, dir) = setup_temp_dir();
    let good = encode(&put(1, "k", "v")).unwrap();
    write_raw(&segment_path(&dir, 1), &[&good, &[9u8; 5]]);

    let (_, first) = recover(&dir, &[1]);
    let (records, second) = recover(&dir, &[1]);

    assert!(first.was_truncated);
    assert!(!second.was_truncated);
    assert_eq!(records.len(), 1);
}

// =============================================================================
// Recover: Corruption Tests (CRC mismatch)
// =============================================================================

#[test]
fn test_recover_corrupted_record() {
    let (_temp, dir) = setup_temp_dir();
    let good = encode(&put(1, "k1", "v1")).unwrap();
    let mut bad = encode(&put(2, "k2", "v2")).unwrap();
    if let Some(byte) = bad.last_mut() {
        *byte ^= 0xFF;
    }
    let after = encode(&put(3, "k3", "v3")).unwrap();
    write_raw(&segment_path(&dir, 1), &[&good, &bad, &after]);

    let (records, report) = recover(&dir, &[1]);

    // Nothing after the corrupt record is applied
    assert_eq!(records.len(), 1);
    assert_eq!(report.records_recovered, 1);
    assert_eq!(report.records_corrupted, 1);
    assert_eq!(report.last_sequence, 1);
    assert_eq!(report.truncated_bytes, (bad.len() + after.len()) as u64);
    assert!(report.was_truncated);
}

#[test]
fn test_recover_corruption_at_first_record() {
    let (_temp, dir) = setup_temp_dir();
    let mut bytes = encode(&put(1, "k", "v")).unwrap();
    bytes[20] ^= 0xFF;
    write_raw(&segment_path(&dir, 1), &[&bytes]);

    let (records, report) = recover(&dir, &[1]);

    assert!(records.is_empty());
    assert_eq!(report.records_corrupted, 1);
    assert_eq!(report.last_sequence, 0);
    assert!(report.was_truncated);
    assert_eq!(fs::metadata(segment_path(&dir, 1)).unwrap().len(), 0);
}

#[test]
fn test_recover_drops_segments_after_damage() {
    let (_temp, dir) = setup_temp_dir();
    write_records_via_writer(&dir, 1, 1, 3);
    write_records_via_writer(&dir, 2, 4, 3);
    write_records_via_writer(&dir, 3, 7, 3);

    let mut file = OpenOptions::new().append(true).open(segment_path(&dir, 2)).unwrap();
    file.write_all(&[0xAB; 4]).unwrap();
    drop(file);

    let (records, report) = recover(&dir, &[1, 2, 3]);

    assert_eq!(records.len(), 6);
    assert_eq!(report.last_sequence, 6);
    assert_eq!(report.dropped_segments, vec![3]);
    assert!(!segment_path(&dir, 3).exists());
    assert!(segment_path(&dir, 2).exists());
}

#[test]
fn test_recover_missing_segment_fails_and_keeps_files() {
    let (_temp, dir) = setup_temp_dir();
    write_records_via_writer(&dir, 1, 1, 3);
    write_records_via_writer(&dir, 3, 7, 3);

    let result = LogRecovery::recover(&dir, &[1, 2, 3], |_| {});

    match result {
        Err(BurrowError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert_eq!(fs::metadata(segment_path(&dir, 1)).unwrap().len(), 3 * frame_len());
    assert_eq!(fs::metadata(segment_path(&dir, 3)).unwrap().len(), 3 * frame_len());
}

#[test]
fn test_recover_unreadable_segment_fails_and_keeps_files() {
    let (_temp, dir) = setup_temp_dir();
    write_records_via_writer(&dir, 1, 1, 3);
    fs::create_dir(segment_path(&dir, 2)).unwrap();
    write_records_via_writer(&dir, 3, 7, 3);

    assert!(matches!(
        LogRecovery::recover(&dir, &[1, 2, 3], |_| {}),
        Err(BurrowError::Io(_))
    ));
    assert!(matches!(
        LogRecovery::verify(&dir, &[1, 2, 3]),
        Err(BurrowError::Io(_))
    ));

    assert!(segment_path(&dir, 2).is_dir());
    assert_eq!(fs::metadata(segment_path(&dir, 3)).unwrap().len(), 3 * frame_len());
}

/// Size of one record written by `write_records_via_writer` with a
/// single-digit index
fn frame_len() -> u64 {
    encode(&put(1, "key0", "value0")).unwrap().len() as u64
}

// =============================================================================
// Verify Tests (stats only, same logic as recover)
// =============================================================================

#[test]
fn test_verify_clean_log() {
    let (_temp, dir) = setup_temp_dir();
    write_records_via_writer(&dir, 1, 1, 5);

    let report = LogRecovery::verify(&dir, &[1]).unwrap();

    assert_eq!(report.records_recovered, 5);
    assert_eq!(report.records_corrupted, 0);
    assert_eq!(report.last_sequence, 5);
    assert!(!report.was_truncated);
}

#[test]
fn test_verify_does_not_modify_files() {
    let (_temp, dir) = setup_temp_dir();
    let path = segment_path(&dir, 1);
    let good = encode(&put(1, "k", "v")).unwrap();
    write_raw(&path, &[&good, &[0u8; 5]]);
    write_records_via_writer(&dir, 2, 2, 2);

    let report = LogRecovery::verify(&dir, &[1, 2]).unwrap();

    assert_eq!(report.records_recovered, 1);
    assert_eq!(report.truncated_bytes, 5);
    assert_eq!(report.dropped_segments, vec![2]);
    assert!(report.was_truncated);

    assert_eq!(fs::metadata(&path).unwrap().len(), good.len() as u64 + 5);
    assert!(segment_path(&dir, 2).exists());
}

// =============================================================================
// Recover + Verify Consistency Test
// =============================================================================

#[test]
fn test_recover_and_verify_agree() {
    let (_temp, dir) = setup_temp_dir();
    write_records_via_writer(&dir, 1, 1, 20);

    let verify_report = LogRecovery::verify(&dir, &[1]).unwrap();
    let (records, recover_report) = recover(&dir, &[1]);

    assert_eq!(records.len(), recover_report.records_recovered as usize);
    assert_eq!(recover_report, verify_report);
}

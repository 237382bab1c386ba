//! Tests for segment files
//!
//! These tests verify:
//! - Writing and reading back entries, tombstones included
//! - Index-backed point lookups and range positioning
//! - Key order and record length limits in the writer
//! - Rejection of truncated or corrupted files
//! - Temp-file handling during writes

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use shardkv::entry::Entry;
use shardkv::error::ShardError;
use shardkv::storage::segment::{record_field_len, segment_path};
use shardkv::storage::{Segment, SegmentWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn entry(key: &str, value: &str) -> Entry {
    Entry::new(key.as_bytes().to_vec(), value.as_bytes().to_vec())
}

fn tombstone(key: &str) -> Entry {
    Entry::tombstone(key.as_bytes().to_vec())
}

fn write(dir: &TempDir, id: u64, entries: &[Entry]) -> PathBuf {
    let mut writer = SegmentWriter::create(dir.path(), id).unwrap();
    for e in entries {
        writer.add(e).unwrap();
    }
    writer.finish().unwrap().0
}

fn setup_segment(entries: &[Entry]) -> (TempDir, Arc<Segment>) {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, 1, entries);
    let segment = Arc::new(Segment::open(&path, 1).unwrap());
    (dir, segment)
}

fn value_of(entry: &Entry) -> Option<&[u8]> {
    entry.value().map(|v| v.as_ref())
}

// =============================================================================
// Write/Read Tests
// =============================================================================

#[test]
fn test_write_and_get() {
    let (_dir, segment) = setup_segment(&[entry("a", "1"), entry("b", "2"), entry("c", "3")]);

    assert_eq!(value_of(&segment.get(b"a").unwrap().unwrap()), Some(&b"1"[..]));
    assert_eq!(value_of(&segment.get(b"c").unwrap().unwrap()), Some(&b"3"[..]));
    assert!(segment.get(b"bb").unwrap().is_none());
    assert!(segment.get(b"z").unwrap().is_none());
}

#[test]
fn test_tombstone_round_trips() {
    let (_dir, segment) = setup_segment(&[entry("a", "1"), tombstone("b")]);

    let found = segment.get(b"b").unwrap().unwrap();
    assert!(found.is_tombstone());
    assert_eq!(segment.meta().tombstone_count, 1);
    assert_eq!(segment.meta().entry_count, 2);
}

#[test]
fn test_empty_value_distinct_from_tombstone() {
    let (_dir, segment) = setup_segment(&[entry("empty", ""), tombstone("gone")]);

    let empty = segment.get(b"empty").unwrap().unwrap();
    assert!(!empty.is_tombstone());
    assert_eq!(empty.value(), Some(&Bytes::new()));
    assert!(segment.get(b"gone").unwrap().unwrap().is_tombstone());
}

#[test]
fn test_full_scan_reproduces_entries() {
    let entries = vec![entry("k1", "v1"), tombstone("k2"), entry("k3", "")];
    let (_dir, segment) = setup_segment(&entries);

    let scanned: Vec<Entry> = segment.range(b"", None).map(|r| r.unwrap()).collect();

    assert_eq!(scanned, entries);
}

#[test]
fn test_range_positions_with_index() {
    let entries: Vec<Entry> = (0..100)
        .map(|i| entry(&format!("key_{:03}", i), &format!("v{}", i)))
        .collect();
    let (_dir, segment) = setup_segment(&entries);

    let keys: Vec<Vec<u8>> = segment
        .range(b"key_040", Some(b"key_045"))
        .map(|r| r.unwrap().key().to_vec())
        .collect();

    let expected: Vec<Vec<u8>> = (40..45)
        .map(|i| format!("key_{:03}", i).into_bytes())
        .collect();
    assert_eq!(keys, expected);
}

#[test]
fn test_range_bounds_between_keys() {
    let (_dir, segment) = setup_segment(&[entry("b", "1"), entry("d", "2"), entry("f", "3")]);

    let keys: Vec<Vec<u8>> = segment
        .range(b"c", Some(b"f"))
        .map(|r| r.unwrap().key().to_vec())
        .collect();

    assert_eq!(keys, vec![b"d".to_vec()]);
}

#[test]
fn test_empty_segment() {
    let (_dir, segment) = setup_segment(&[]);

    assert_eq!(segment.entry_count(), 0);
    assert!(segment.get(b"any").unwrap().is_none());
    assert!(segment.range(b"", None).next().is_none());
}

#[test]
fn test_binary_keys_and_values() {
    let entries = vec![
        Entry::new(vec![0x00, 0x01], vec![0xff; 300]),
        Entry::new(vec![0x00, 0xff], vec![]),
        Entry::new(vec![0xff], vec![0x00]),
    ];
    let (_dir, segment) = setup_segment(&entries);

    let found = segment.get(&[0x00, 0x01]).unwrap().unwrap();
    assert_eq!(found.value().unwrap().len(), 300);
}

#[test]
fn test_meta_records_key_bounds() {
    let (_dir, segment) = setup_segment(&[entry("apple", "1"), entry("pear", "2")]);

    assert_eq!(segment.meta().min_key, b"apple".to_vec());
    assert_eq!(segment.meta().max_key, b"pear".to_vec());
    assert!(segment.meta().might_contain(b"banana"));
    assert!(!segment.meta().might_contain(b"zebra"));
}

// =============================================================================
// Writer Ordering Tests
// =============================================================================

#[test]
fn test_writer_rejects_unsorted_keys() {
    let dir = TempDir::new().unwrap();
    let mut writer = SegmentWriter::create(dir.path(), 1).unwrap();

    writer.add(&entry("b", "1")).unwrap();
    assert!(writer.add(&entry("a", "2")).is_err());
}

#[test]
fn test_writer_rejects_duplicate_keys() {
    let dir = TempDir::new().unwrap();
    let mut writer = SegmentWriter::create(dir.path(), 1).unwrap();

    writer.add(&entry("a", "1")).unwrap();
    assert!(writer.add(&entry("a", "2")).is_err());
}

#[test]
fn test_record_field_len_limits() {
    assert_eq!(record_field_len(0), Some(0));
    assert_eq!(record_field_len(4096), Some(4096));
    assert_eq!(record_field_len(u32::MAX as usize - 1), Some(u32::MAX - 1));

    // u32::MAX is the tombstone marker
    assert_eq!(record_field_len(u32::MAX as usize), None);
    if let Ok(len) = usize::try_from(u64::from(u32::MAX) + 1) {
        assert_eq!(record_field_len(len), None);
    }
}

#[test]
fn test_writer_accepts_large_value_within_limit() {
    let dir = TempDir::new().unwrap();
    let big = vec![7u8; 1 << 20];
    let mut writer = SegmentWriter::create(dir.path(), 1).unwrap();
    writer
        .add(&Entry::new(Bytes::from_static(b"big"), Bytes::from(big.clone())))
        .unwrap();
    let (path, _) = writer.finish().unwrap();

    let segment = Segment::open(&path, 1).unwrap();
    let found = segment.get(b"big").unwrap().unwrap();
    assert_eq!(value_of(&found), Some(big.as_slice()));
}

#[test]
fn test_unfinished_segment_not_visible() {
    let dir = TempDir::new().unwrap();
    let mut writer = SegmentWriter::create(dir.path(), 7).unwrap();
    writer.add(&entry("a", "1")).unwrap();

    assert!(!segment_path(dir.path(), 7).exists());

    let (path, _) = writer.finish().unwrap();
    assert_eq!(path, segment_path(dir.path(), 7));
    assert!(path.exists());
}

#[test]
fn test_abandon_removes_temp_file() {
    let dir = TempDir::new().unwrap();
    let mut writer = SegmentWriter::create(dir.path(), 3).unwrap();
    writer.add(&entry("a", "1")).unwrap();

    writer.abandon();

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_truncated_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, 1, &[entry("a", "1"), entry("b", "2")]);

    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 5).unwrap();

    assert!(Segment::open(&path, 1).is_err());
}

#[test]
fn test_flipped_data_byte_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, 1, &[entry("alpha", "one"), entry("beta", "two")]);

    // Inside the first record's key
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(6 + 8)).unwrap();
    file.write_all(b"X").unwrap();
    drop(file);

    match Segment::open(&path, 1) {
        Err(ShardError::Corruption(_)) => {}
        other => panic!("expected corruption, got {:?}", other.map(|s| s.id())),
    }
}

#[test]
fn test_bad_magic_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, 1, &[entry("a", "1")]);

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.write_all(b"NOPE").unwrap();
    drop(file);

    assert!(Segment::open(&path, 1).is_err());
}

#[test]
fn test_garbage_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = segment_path(dir.path(), 1);
    fs::write(&path, b"definitely not a segment").unwrap();

    assert!(Segment::open(&path, 1).is_err());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_reads_fail_after_close() {
    let (_dir, segment) = setup_segment(&[entry("a", "1")]);

    segment.close();

    assert!(segment.is_closed());
    assert!(segment.get(b"a").is_err());
}

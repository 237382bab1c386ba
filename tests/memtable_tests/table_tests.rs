//! Tests for MemTable
//!
//! These tests verify:
//! - Basic put/get operations
//! - Tombstones and overwrites
//! - Size tracking and flush threshold
//! - Sorted range cursors
//! - Concurrent inserts

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use shardkv::entry::Entry;
use shardkv::memtable::MemTable;

// =============================================================================
// Helper Functions
// =============================================================================

fn entry(key: &str, value: &str) -> Entry {
    Entry::new(key.as_bytes().to_vec(), value.as_bytes().to_vec())
}

fn keys(entries: impl Iterator<Item = Entry>) -> Vec<String> {
    entries
        .map(|e| String::from_utf8(e.key().to_vec()).unwrap())
        .collect()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let table = MemTable::new(1024);

    assert!(table.is_empty());
    assert_eq!(table.size(), 0);
    assert_eq!(table.entry_count(), 0);
    assert!(!table.overflow());
}

#[test]
fn test_put_and_get() {
    let table = MemTable::new(1024);

    table.put(entry("hello", "world"));

    let found = table.get(b"hello").unwrap();
    assert_eq!(found.value(), Some(&Bytes::from_static(b"world")));
    assert!(table.get(b"missing").is_none());
}

#[test]
fn test_put_overwrites_value() {
    let table = MemTable::new(1024);

    table.put(entry("key", "v1"));
    table.put(entry("key", "v2"));

    assert_eq!(table.entry_count(), 1);
    assert_eq!(
        table.get(b"key").unwrap().value(),
        Some(&Bytes::from_static(b"v2"))
    );
}

#[test]
fn test_tombstone_replaces_value() {
    let table = MemTable::new(1024);

    table.put(entry("key", "value"));
    table.put(Entry::tombstone(Bytes::from_static(b"key")));

    let found = table.get(b"key").unwrap();
    assert!(found.is_tombstone());
    assert_eq!(found.value(), None);
}

#[test]
fn test_value_replaces_tombstone() {
    let table = MemTable::new(1024);

    table.put(Entry::tombstone(Bytes::from_static(b"key")));
    table.put(entry("key", "back"));

    assert!(!table.get(b"key").unwrap().is_tombstone());
}

#[test]
fn test_empty_value_is_not_tombstone() {
    let table = MemTable::new(1024);

    table.put(entry("key", ""));

    let found = table.get(b"key").unwrap();
    assert!(!found.is_tombstone());
    assert_eq!(found.value(), Some(&Bytes::new()));
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_counts_key_and_value() {
    let table = MemTable::new(1024);

    table.put(entry("abc", "12345"));

    assert_eq!(table.size(), 8);
}

#[test]
fn test_size_counts_new_entry_on_overwrite() {
    let table = MemTable::new(1024);

    table.put(entry("key", "long_value"));
    table.put(entry("key", "v"));

    // Never decreases; the new entry is added, the old one is not subtracted
    assert_eq!(table.size(), 13 + 4);
}

#[test]
fn test_tombstone_counts_key_only() {
    let table = MemTable::new(1024);

    table.put(Entry::tombstone(Bytes::from_static(b"gone")));

    assert_eq!(table.size(), 4);
}

#[test]
fn test_put_reports_overflow_past_threshold() {
    let table = MemTable::new(10);

    assert!(!table.put(entry("aaaa", "bbbb"))); // 8
    assert!(!table.put(entry("c", "d"))); // 10, not above
    assert!(table.put(entry("e", ""))); // 11

    assert!(table.overflow());
}

// =============================================================================
// Range Tests
// =============================================================================

#[test]
fn test_values_sorted_by_key() {
    let table = MemTable::new(1024);

    for key in ["delta", "alpha", "charlie", "bravo"] {
        table.put(entry(key, "v"));
    }

    assert_eq!(
        keys(table.values()),
        vec!["alpha", "bravo", "charlie", "delta"]
    );
}

#[test]
fn test_values_include_tombstones() {
    let table = MemTable::new(1024);

    table.put(entry("a", "1"));
    table.put(Entry::tombstone(Bytes::from_static(b"b")));

    let all: Vec<Entry> = table.values().collect();
    assert_eq!(all.len(), 2);
    assert!(all[1].is_tombstone());
}

#[test]
fn test_range_is_half_open() {
    let table = MemTable::new(1024);

    for key in ["a", "b", "c", "d", "e"] {
        table.put(entry(key, "v"));
    }

    assert_eq!(keys(table.range(b"b", Some(b"d"))), vec!["b", "c"]);
    assert_eq!(keys(table.range(b"c", None)), vec!["c", "d", "e"]);
    assert_eq!(keys(table.range(b"", Some(b"b"))), vec!["a"]);
}

#[test]
fn test_range_bounds_between_keys() {
    let table = MemTable::new(1024);

    for key in ["apple", "banana", "cherry"] {
        table.put(entry(key, "v"));
    }

    assert_eq!(keys(table.range(b"b", Some(b"c"))), vec!["banana"]);
    assert!(table.range(b"z", None).next().is_none());
}

#[test]
fn test_range_orders_raw_bytes() {
    let table = MemTable::new(1024);

    table.put(Entry::new(vec![0xff], b"high".to_vec()));
    table.put(Entry::new(vec![0x00], b"low".to_vec()));
    table.put(Entry::new(vec![0x7f], b"mid".to_vec()));

    let order: Vec<Vec<u8>> = table.values().map(|e| e.key().to_vec()).collect();
    assert_eq!(order, vec![vec![0x00], vec![0x7f], vec![0xff]]);
}

#[test]
fn test_range_survives_concurrent_insert() {
    let table = MemTable::new(1024);

    table.put(entry("a", "1"));
    table.put(entry("c", "3"));

    let mut cursor = table.range(b"", None);
    assert_eq!(cursor.next().unwrap().key().as_ref(), b"a");

    // Inserted after the cursor passed "a" but before it reached "b"
    table.put(entry("b", "2"));

    assert_eq!(keys(cursor), vec!["b", "c"]);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_puts() {
    let table = Arc::new(MemTable::new(usize::MAX));
    let mut handles = vec![];

    for t in 0..8 {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            for i in 0..500 {
                table.put(entry(&format!("t{}_k{:04}", t, i), "v"));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.entry_count(), 8 * 500);
    let all: Vec<Entry> = table.values().collect();
    assert!(all.windows(2).all(|w| w[0].key() < w[1].key()));
}

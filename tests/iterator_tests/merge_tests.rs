//! Tests for MergeIterator and TombstoneFilter
//!
//! These tests verify:
//! - Global key order across sources
//! - Newest-source-wins on duplicate keys
//! - Tombstone hiding in the filtered stream
//! - Error pass-through from a failing source

use shardkv::entry::Entry;
use shardkv::error::ShardError;
use shardkv::iterator::{EntryIter, MergeIterator, TombstoneFilter};

// =============================================================================
// Helper Functions
// =============================================================================

fn entry(key: &str, value: &str) -> Entry {
    Entry::new(key.as_bytes().to_vec(), value.as_bytes().to_vec())
}

fn tombstone(key: &str) -> Entry {
    Entry::tombstone(key.as_bytes().to_vec())
}

fn source(entries: Vec<Entry>) -> EntryIter {
    Box::new(entries.into_iter().map(Ok))
}

fn pairs<I: Iterator<Item = shardkv::Result<Entry>>>(iter: I) -> Vec<(String, Option<String>)> {
    iter.map(|r| {
        let e = r.unwrap();
        (
            String::from_utf8(e.key().to_vec()).unwrap(),
            e.value().map(|v| String::from_utf8(v.to_vec()).unwrap()),
        )
    })
    .collect()
}

fn live(key: &str, value: &str) -> (String, Option<String>) {
    (key.to_string(), Some(value.to_string()))
}

// =============================================================================
// Merge Order Tests
// =============================================================================

#[test]
fn test_merge_no_sources() {
    let merged = MergeIterator::new(vec![]);
    assert_eq!(merged.count(), 0);
}

#[test]
fn test_merge_interleaves_sorted_sources() {
    let merged = MergeIterator::new(vec![
        source(vec![entry("a", "1"), entry("d", "4")]),
        source(vec![entry("b", "2"), entry("e", "5")]),
        source(vec![entry("c", "3")]),
    ]);

    assert_eq!(
        pairs(merged),
        vec![
            live("a", "1"),
            live("b", "2"),
            live("c", "3"),
            live("d", "4"),
            live("e", "5")
        ]
    );
}

#[test]
fn test_merge_skips_empty_sources() {
    let merged = MergeIterator::new(vec![
        source(vec![]),
        source(vec![entry("a", "1")]),
        source(vec![]),
    ]);

    assert_eq!(pairs(merged), vec![live("a", "1")]);
}

// =============================================================================
// Priority Tests
// =============================================================================

#[test]
fn test_lower_source_index_wins() {
    let merged = MergeIterator::new(vec![
        source(vec![entry("k", "memtable")]),
        source(vec![entry("k", "flushing")]),
        source(vec![entry("k", "newest_segment")]),
        source(vec![entry("k", "oldest_segment")]),
    ]);

    assert_eq!(pairs(merged), vec![live("k", "memtable")]);
}

#[test]
fn test_duplicate_only_in_older_sources() {
    let merged = MergeIterator::new(vec![
        source(vec![entry("a", "top")]),
        source(vec![entry("b", "mid")]),
        source(vec![entry("b", "low"), entry("c", "low")]),
    ]);

    assert_eq!(
        pairs(merged),
        vec![live("a", "top"), live("b", "mid"), live("c", "low")]
    );
}

#[test]
fn test_merge_keeps_winning_tombstone() {
    let merged = MergeIterator::new(vec![
        source(vec![tombstone("k")]),
        source(vec![entry("k", "old")]),
    ]);

    assert_eq!(pairs(merged), vec![("k".to_string(), None)]);
}

// =============================================================================
// Tombstone Filter Tests
// =============================================================================

#[test]
fn test_filter_hides_deleted_keys() {
    let filtered = TombstoneFilter::new(MergeIterator::new(vec![
        source(vec![tombstone("a"), entry("c", "new")]),
        source(vec![entry("a", "1"), entry("b", "2"), entry("c", "old")]),
    ]));

    assert_eq!(pairs(filtered), vec![live("b", "2"), live("c", "new")]);
}

#[test]
fn test_filter_newer_value_resurrects_key() {
    let filtered = TombstoneFilter::new(MergeIterator::new(vec![
        source(vec![entry("k", "again")]),
        source(vec![tombstone("k")]),
        source(vec![entry("k", "first")]),
    ]));

    assert_eq!(pairs(filtered), vec![live("k", "again")]);
}

#[test]
fn test_filter_all_tombstones() {
    let filtered = TombstoneFilter::new(MergeIterator::new(vec![source(vec![
        tombstone("a"),
        tombstone("b"),
    ])]));

    assert_eq!(filtered.count(), 0);
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_source_error_is_yielded_once() {
    let failing: EntryIter = Box::new(
        vec![
            Ok(entry("a", "1")),
            Err(ShardError::Storage("disk gone".to_string())),
            Ok(entry("z", "never")),
        ]
        .into_iter(),
    );
    let merged = MergeIterator::new(vec![failing, source(vec![entry("b", "2")])]);

    let results: Vec<_> = merged.collect();

    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    let keys: Vec<Vec<u8>> = results
        .into_iter()
        .filter_map(|r| r.ok())
        .map(|e| e.key().to_vec())
        .collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
}

//! MemTable implementation
//!
//! SkipMap-based memtable with atomic size accounting.

use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::entry::Entry;

type Table = SkipMap<Bytes, Option<Bytes>>;

/// In-memory table for recent writes
pub struct MemTable {
    /// Key → value (`None` = tombstone)
    data: Arc<Table>,

    /// Sum of key + value bytes of every put since creation
    size: AtomicUsize,

    /// Size above which `put` reports an overflow
    flush_threshold: usize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            data: Arc::new(SkipMap::new()),
            size: AtomicUsize::new(0),
            flush_threshold,
        }
    }

    /// Insert or replace an entry.
    ///
    /// Returns `true` when the accumulated size now exceeds the flush
    /// threshold. The size only grows: a replaced entry is not subtracted.
    pub fn put(&self, entry: Entry) -> bool {
        let entry_size = entry.encoded_size();
        let (key, value) = entry.into_parts();
        self.data.insert(key, value);

        let new_size = self.size.fetch_add(entry_size, Ordering::SeqCst) + entry_size;
        new_size > self.flush_threshold
    }

    /// Get the entry for `key`, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.data
            .get(key)
            .map(|e| Entry::from_parts(e.key().clone(), e.value().clone()))
    }

    /// Lazy cursor over `[from, to)`; `to = None` runs to the end of the keyspace
    pub fn range(&self, from: &[u8], to: Option<&[u8]>) -> MemTableRange {
        MemTableRange {
            data: Arc::clone(&self.data),
            next_from: Bound::Included(Bytes::copy_from_slice(from)),
            to: to.map(Bytes::copy_from_slice),
            done: false,
        }
    }

    /// Every entry in key order
    pub fn values(&self) -> MemTableRange {
        MemTableRange {
            data: Arc::clone(&self.data),
            next_from: Bound::Unbounded,
            to: None,
            done: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the accumulated size exceeds the flush threshold
    pub fn overflow(&self) -> bool {
        self.size() > self.flush_threshold
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.len()
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }
}

/// Owning cursor over a MemTable range.
///
/// Each step re-seeks just past the last returned key, so the cursor holds no
/// borrow into the skip list and keeps working while writers insert.
pub struct MemTableRange {
    data: Arc<Table>,
    next_from: Bound<Bytes>,
    to: Option<Bytes>,
    done: bool,
}

impl Iterator for MemTableRange {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let found = match &self.next_from {
            Bound::Included(k) => self.data.lower_bound(Bound::Included(&k[..])),
            Bound::Excluded(k) => self.data.lower_bound(Bound::Excluded(&k[..])),
            Bound::Unbounded => self.data.front(),
        };

        let Some(found) = found else {
            self.done = true;
            return None;
        };

        let key = found.key().clone();
        if let Some(to) = &self.to {
            if key >= *to {
                self.done = true;
                return None;
            }
        }

        let value = found.value().clone();
        self.next_from = Bound::Excluded(key.clone());
        Some(Entry::from_parts(key, value))
    }
}

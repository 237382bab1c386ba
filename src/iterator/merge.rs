//! K-way merge over sorted entry sources.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bytes::Bytes;

use crate::entry::Entry;
use crate::error::Result;

use super::EntryIter;

struct HeapEntry {
    entry: Entry,
    /// Index of the source; lower = newer layer
    source: usize,
    iterator: EntryIter,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap is a max-heap: reverse so the smallest (key, source) pops first
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .key()
            .cmp(other.entry.key())
            .then(self.source.cmp(&other.source))
            .reverse()
    }
}

/// Globally sorted merge of several sources.
///
/// Sources are given in priority order. When several sources hold the same
/// key, the entry from the lowest-index source is emitted and the others are
/// skipped. A source that yields an error has that error passed through once
/// and is then dropped.
pub struct MergeIterator {
    heap: BinaryHeap<HeapEntry>,
    last_key: Option<Bytes>,
    pending_errors: Vec<crate::error::ShardError>,
}

impl MergeIterator {
    pub fn new(sources: Vec<EntryIter>) -> Self {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            last_key: None,
            pending_errors: Vec::new(),
        };
        for (source, iterator) in sources.into_iter().enumerate() {
            merge.refill(source, iterator);
        }
        merge
    }

    /// Pull the next entry from `iterator` and put it back on the heap
    fn refill(&mut self, source: usize, mut iterator: EntryIter) {
        match iterator.next() {
            Some(Ok(entry)) => self.heap.push(HeapEntry {
                entry,
                source,
                iterator,
            }),
            Some(Err(e)) => self.pending_errors.push(e),
            None => {}
        }
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.pending_errors.pop() {
                return Some(Err(e));
            }

            let HeapEntry {
                entry,
                source,
                iterator,
            } = self.heap.pop()?;

            self.refill(source, iterator);

            // Shadowed by a newer layer already emitted
            if self.last_key.as_ref() == Some(entry.key()) {
                continue;
            }

            self.last_key = Some(entry.key().clone());
            return Some(Ok(entry));
        }
    }
}

//! Segment Iterator
//!
//! Sequential iteration over a slice of a segment's data block.

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::Result;

use super::reader::Segment;

/// Iterator over segment entries in sorted key order.
///
/// Owns an `Arc` to its segment, so it outlives the snapshot it came from.
pub struct SegmentRange {
    segment: Arc<Segment>,
    /// Current position in file
    current_offset: u64,
    /// Stop reading when we reach this offset
    end_offset: u64,
}

impl SegmentRange {
    pub(super) fn new(segment: Arc<Segment>, start: u64, end: u64) -> Self {
        Self {
            segment,
            current_offset: start,
            end_offset: end,
        }
    }
}

impl Iterator for SegmentRange {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_offset >= self.end_offset {
            return None;
        }

        match self.segment.read_entry_at(self.current_offset) {
            Ok((entry, next)) => {
                self.current_offset = next;
                Some(Ok(entry))
            }
            Err(e) => {
                // A failed read ends the cursor
                self.current_offset = self.end_offset;
                Some(Err(e))
            }
        }
    }
}

//! Iterator Module
//!
//! Combines the per-layer cursors into one sorted, deduplicated stream.
//!
//! ## Layers, highest priority first
//! ```text
//!   memtable → flushing buffer → newest segment → … → oldest segment
//! ```
//! On equal keys only the highest-priority layer's entry survives; the
//! tombstone filter then hides keys whose winning entry is a deletion.

mod merge;
mod tombstone;

pub use merge::MergeIterator;
pub use tombstone::TombstoneFilter;

use crate::entry::Entry;
use crate::error::Result;

/// A boxed source of entries in ascending key order
pub type EntryIter = Box<dyn Iterator<Item = Result<Entry>> + Send>;

/// Range scan result handed to callers: merged and tombstone-free
pub type RangeIter = TombstoneFilter<MergeIterator>;

//! Storage Module
//!
//! Persistent storage layer: immutable sorted segment files.
//!
//! ## Responsibilities
//! - Persist flushed memtables as sorted segments
//! - O(log n) point lookups and range positioning through per-segment indexes
//! - Full compaction of all segments into one
//! - Survive interrupted saves: partial files are ignored, not fatal
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── segment_000001.seg
//!   ├── segment_000002.seg      (higher id = newer)
//!   └── segment_000003.seg.tmp  (interrupted save, removed on load)
//! ```

mod manager;
pub mod segment;

pub use manager::{write_segment, SegmentStorage};
pub use segment::{Segment, SegmentMeta, SegmentRange, SegmentWriter};

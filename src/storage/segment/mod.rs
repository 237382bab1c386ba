//! Segment Module
//!
//! Immutable on-disk sorted run of entries.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                        │
//! │   Magic: "SKVS" (4) | Version: u16 (2)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each entry ...                       │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Meta Block (variable, bincode SegmentMeta)              │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   MetaOffset: u64 (8) | MetaLen: u32 (4) | MetaCRC (4)  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! A file is written as `segment_{id}.seg.tmp` and renamed into place once
//! fsynced, so a visible `.seg` file is always complete.

mod iterator;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use iterator::SegmentRange;
pub use reader::Segment;
pub use writer::SegmentWriter;

// =============================================================================
// Shared Constants (used by writer, reader, iterator)
// =============================================================================

/// Magic bytes identifying a shardkv segment file
pub(crate) const MAGIC: &[u8; 4] = b"SKVS";

/// Current segment format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2)
pub(crate) const HEADER_SIZE: u64 = 6;

/// Footer size: MetaOffset (8) + MetaLen (4) + MetaCRC (4)
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Per-record header: KeyLen (4) + ValLen (4)
pub(crate) const RECORD_HEADER_SIZE: u64 = 8;

/// Sentinel value indicating a tombstone (deleted key)
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

const FILE_PREFIX: &str = "segment_";
const FILE_EXTENSION: &str = "seg";
const TMP_EXTENSION: &str = "tmp";

// =============================================================================
// Segment Metadata
// =============================================================================

/// Trailer describing a finished segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Number of records (tombstones included)
    pub entry_count: u64,
    /// Number of tombstone records
    pub tombstone_count: u64,
    /// Where the index block starts (= end of the data block)
    pub index_offset: u64,
    /// CRC32 over the data block
    pub data_crc: u32,
    /// Smallest key (empty for an empty segment)
    pub min_key: Vec<u8>,
    /// Largest key (empty for an empty segment)
    pub max_key: Vec<u8>,
    /// Set on compaction output: every segment id up to and including this
    /// one was merged into this segment
    pub replaces_through: Option<u64>,
}

/// Length prefix for a key or value record field
///
/// `None` when the length does not fit in a `u32` or collides with the
/// tombstone marker.
pub fn record_field_len(len: usize) -> Option<u32> {
    u32::try_from(len).ok().filter(|&n| n != TOMBSTONE_MARKER)
}

impl SegmentMeta {
    /// Quick check if a key might be in this segment (range check)
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.entry_count > 0 && key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}

// =============================================================================
// File Naming
// =============================================================================

/// "segment_000042.seg" for id 42
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}{:06}.{}", FILE_PREFIX, id, FILE_EXTENSION))
}

pub(crate) fn temp_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!(
        "{}{:06}.{}.{}",
        FILE_PREFIX, id, FILE_EXTENSION, TMP_EXTENSION
    ))
}

/// "segment_000042.seg" → Some(42)
pub(crate) fn parse_segment_id(path: &Path) -> Option<u64> {
    if path.extension()? != FILE_EXTENSION {
        return None;
    }
    let name = path.file_stem()?.to_str()?;
    name.strip_prefix(FILE_PREFIX)?.parse().ok()
}

/// Leftover of an interrupted save
pub(crate) fn is_temp_file(path: &Path) -> bool {
    let is_tmp = path.extension().map_or(false, |ext| ext == TMP_EXTENSION);
    let named_like_segment = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with(FILE_PREFIX));
    is_tmp && named_like_segment
}

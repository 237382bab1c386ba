//! Segment Reader
//!
//! Opens segment files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::entry::Entry;
use crate::error::{Result, ShardError};

use super::iterator::SegmentRange;
use super::{
    SegmentMeta, FOOTER_SIZE, HEADER_SIZE, MAGIC, RECORD_HEADER_SIZE, TOMBSTONE_MARKER, VERSION,
};

/// An open, validated segment.
///
/// The file handle sits behind a mutex so lookups and range cursors can share
/// one reader through `&self`; `close()` takes it out for good.
pub struct Segment {
    id: u64,
    path: PathBuf,
    file: Mutex<Option<BufReader<File>>>,
    /// In-memory index: key → file offset
    index: BTreeMap<Bytes, u64>,
    meta: SegmentMeta,
}

impl Segment {
    /// Open and validate a segment.
    ///
    /// Checks magic, version, footer CRC, index shape, and the data-block CRC,
    /// so a truncated or damaged file is rejected here rather than on read.
    pub fn open(path: &Path, id: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(ShardError::Corruption(format!(
                "{}: file too short ({} bytes)",
                path.display(),
                file_size
            )));
        }

        // Header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(ShardError::Corruption(format!(
                "{}: invalid magic {:?}",
                path.display(),
                &header[0..4]
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(ShardError::Corruption(format!(
                "{}: unsupported segment version {}",
                path.display(),
                version
            )));
        }

        // Footer → meta block
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let meta_offset = read_u64(&footer[0..8]);
        let meta_len = read_u32(&footer[8..12]) as u64;
        let meta_crc = read_u32(&footer[12..16]);

        if meta_offset < HEADER_SIZE || meta_offset + meta_len + FOOTER_SIZE != file_size {
            return Err(ShardError::Corruption(format!(
                "{}: footer points outside the file",
                path.display()
            )));
        }

        let mut meta_bytes = vec![0u8; meta_len as usize];
        file.seek(SeekFrom::Start(meta_offset))?;
        file.read_exact(&mut meta_bytes)?;
        if crc32fast::hash(&meta_bytes) != meta_crc {
            return Err(ShardError::Corruption(format!(
                "{}: meta block checksum mismatch",
                path.display()
            )));
        }
        let meta: SegmentMeta = bincode::deserialize(&meta_bytes)?;

        if meta.index_offset < HEADER_SIZE || meta.index_offset > meta_offset {
            return Err(ShardError::Corruption(format!(
                "{}: index offset {} out of bounds",
                path.display(),
                meta.index_offset
            )));
        }

        // Index block
        let mut index_data = vec![0u8; (meta_offset - meta.index_offset) as usize];
        file.seek(SeekFrom::Start(meta.index_offset))?;
        file.read_exact(&mut index_data)?;
        let index = parse_index(&index_data, meta.index_offset).ok_or_else(|| {
            ShardError::Corruption(format!("{}: malformed index block", path.display()))
        })?;
        if index.len() as u64 != meta.entry_count {
            return Err(ShardError::Corruption(format!(
                "{}: index holds {} keys, meta says {}",
                path.display(),
                index.len(),
                meta.entry_count
            )));
        }

        // Data block checksum
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = meta.index_offset - HEADER_SIZE;
        let mut buf = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..chunk])?;
            hasher.update(&buf[..chunk]);
            remaining -= chunk as u64;
        }
        if hasher.finalize() != meta.data_crc {
            return Err(ShardError::Corruption(format!(
                "{}: data block checksum mismatch",
                path.display()
            )));
        }

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file: Mutex::new(Some(BufReader::new(file))),
            index,
            meta,
        })
    }

    /// Get the entry for `key`: O(log n) via the in-memory index.
    ///
    /// Returns:
    /// - `Ok(Some(entry))`: key present (value or tombstone)
    /// - `Ok(None)`: key not in this segment
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if !self.meta.might_contain(key) {
            return Ok(None);
        }
        match self.index.get(key) {
            Some(&offset) => self.read_entry_at(offset).map(|(entry, _)| Some(entry)),
            None => Ok(None),
        }
    }

    /// Lazy cursor over `[from, to)`, positioned through the index
    pub fn range(self: &Arc<Self>, from: &[u8], to: Option<&[u8]>) -> SegmentRange {
        let start = self
            .index
            .range::<[u8], _>((Bound::Included(from), Bound::Unbounded))
            .next()
            .map_or(self.meta.index_offset, |(_, &offset)| offset);

        let end = match to {
            Some(to) => self
                .index
                .range::<[u8], _>((Bound::Included(to), Bound::Unbounded))
                .next()
                .map_or(self.meta.index_offset, |(_, &offset)| offset),
            None => self.meta.index_offset,
        };

        SegmentRange::new(Arc::clone(self), start, end.max(start))
    }

    /// Read the record at `offset`; returns it with the offset of the next one
    pub(crate) fn read_entry_at(&self, offset: u64) -> Result<(Entry, u64)> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(|| {
            ShardError::Storage(format!("segment {} is closed", self.id))
        })?;

        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let key_len = read_u32(&header[0..4]) as usize;
        let val_len = read_u32(&header[4..8]);

        let mut key = vec![0u8; key_len];
        file.read_exact(&mut key)?;

        let mut next = offset + RECORD_HEADER_SIZE + key_len as u64;

        let value = if val_len == TOMBSTONE_MARKER {
            None
        } else {
            let mut v = vec![0u8; val_len as usize];
            file.read_exact(&mut v)?;
            next += val_len as u64;
            Some(Bytes::from(v))
        };

        Ok((Entry::from_parts(Bytes::from(key), value), next))
    }

    /// Release the file handle; later reads fail
    pub fn close(&self) {
        self.file.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn entry_count(&self) -> u64 {
        self.meta.entry_count
    }
}

/// Parse index entries: [key_len(4)][offset(8)][key]
fn parse_index(data: &[u8], data_end: u64) -> Option<BTreeMap<Bytes, u64>> {
    let mut index = BTreeMap::new();
    let mut pos = 0;
    while pos < data.len() {
        let key_len = read_u32(data.get(pos..pos + 4)?) as usize;
        pos += 4;
        let offset = read_u64(data.get(pos..pos + 8)?);
        pos += 8;
        let key = data.get(pos..pos + key_len)?;
        pos += key_len;

        if offset < HEADER_SIZE || offset >= data_end {
            return None;
        }
        index.insert(Bytes::copy_from_slice(key), offset);
    }
    Some(index)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

//! Segment Writer
//!
//! Writes sorted entries to a new segment file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::entry::Entry;
use crate::error::{Result, ShardError};

use super::{
    record_field_len, segment_path, temp_path, SegmentMeta, HEADER_SIZE, MAGIC,
    RECORD_HEADER_SIZE, TOMBSTONE_MARKER, VERSION,
};

/// Writer for a new segment; entries must arrive in strictly ascending key order
pub struct SegmentWriter {
    id: u64,
    dir: PathBuf,
    tmp_path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Current write position (for index)
    current_offset: u64,
    /// Index: key → file offset of entry
    index: Vec<(Vec<u8>, u64)>,
    entry_count: u64,
    tombstone_count: u64,
    last_key: Option<Vec<u8>>,
    replaces_through: Option<u64>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SegmentWriter {
    /// Start segment `id` in `dir`; nothing is visible under the final name
    /// until `finish()`.
    pub fn create(dir: &Path, id: u64) -> Result<Self> {
        let tmp_path = temp_path(dir, id);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;

        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            tmp_path,
            writer,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            entry_count: 0,
            tombstone_count: 0,
            last_key: None,
            replaces_through: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Mark this segment as the compaction of every segment up to `id`
    pub fn replaces_through(mut self, id: u64) -> Self {
        self.replaces_through = Some(id);
        self
    }

    /// Append an entry (tombstones included)
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        let key = entry.key().as_ref();
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(ShardError::Storage(format!(
                    "segment {}: keys must be strictly ascending",
                    self.id
                )));
            }
        }

        let key_len = self.field_len("key", key.len())?;
        let val_len = match entry.value() {
            Some(v) => self.field_len("value", v.len())?,
            None => TOMBSTONE_MARKER,
        };

        self.index.push((key.to_vec(), self.current_offset));

        let key_len_bytes = key_len.to_le_bytes();
        let val_len_bytes = val_len.to_le_bytes();

        self.writer.write_all(&key_len_bytes)?;
        self.writer.write_all(&val_len_bytes)?;
        self.writer.write_all(key)?;

        self.data_hasher.update(&key_len_bytes);
        self.data_hasher.update(&val_len_bytes);
        self.data_hasher.update(key);

        let mut entry_size = RECORD_HEADER_SIZE + key.len() as u64;

        match entry.value() {
            Some(v) => {
                self.writer.write_all(v)?;
                self.data_hasher.update(v);
                entry_size += v.len() as u64;
            }
            None => self.tombstone_count += 1,
        }

        self.current_offset += entry_size;
        self.entry_count += 1;
        self.last_key = Some(key.to_vec());

        Ok(())
    }

    fn field_len(&self, field: &str, len: usize) -> Result<u32> {
        record_field_len(len).ok_or_else(|| {
            ShardError::Storage(format!(
                "segment {}: {} of {} bytes is too long for a record",
                self.id, field, len
            ))
        })
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Write index, meta block, and footer, then move the file into place.
    ///
    /// Returns the final path and the metadata written.
    pub fn finish(mut self) -> Result<(PathBuf, SegmentMeta)> {
        let index_offset = self.current_offset;

        // Index block: [key_len(4)][offset(8)][key] for each entry
        let mut written = 0u64;
        for (key, offset) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(key)?;
            written += 12 + key.len() as u64;
        }

        let meta = SegmentMeta {
            entry_count: self.entry_count,
            tombstone_count: self.tombstone_count,
            index_offset,
            data_crc: self.data_hasher.finalize(),
            min_key: self.index.first().map(|(k, _)| k.clone()).unwrap_or_default(),
            max_key: self.index.last().map(|(k, _)| k.clone()).unwrap_or_default(),
            replaces_through: self.replaces_through,
        };

        let meta_bytes = bincode::serialize(&meta)?;
        let meta_offset = index_offset + written;

        self.writer.write_all(&meta_bytes)?;
        self.writer.write_all(&meta_offset.to_le_bytes())?;
        self.writer.write_all(&(meta_bytes.len() as u32).to_le_bytes())?;
        self.writer.write_all(&crc32fast::hash(&meta_bytes).to_le_bytes())?;
        self.writer.flush()?;

        let file = self.writer.into_inner().map_err(|e| {
            ShardError::Storage(format!("Failed to flush segment {}: {}", self.id, e))
        })?;
        file.sync_all()?;
        drop(file);

        let final_path = segment_path(&self.dir, self.id);
        fs::rename(&self.tmp_path, &final_path)?;
        sync_dir(&self.dir)?;

        Ok((final_path, meta))
    }

    /// Drop the partially written file
    pub fn abandon(self) {
        let tmp_path = self.tmp_path.clone();
        drop(self.writer);
        if let Err(e) = fs::remove_file(&tmp_path) {
            tracing::warn!(path = %tmp_path.display(), error = %e, "failed to remove abandoned segment");
        }
    }
}

/// Persist the rename itself
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

//! Segment Storage
//!
//! The ordered set of segments in the working directory.
//!
//! ## Responsibilities
//! - Discover existing segments on startup, skipping damaged ones
//! - Search segments newest → oldest for reads
//! - Write new segments from flushes and compactions
//!
//! A `SegmentStorage` value never changes once built. Flush and compaction
//! produce a new value; the engine swaps it in with its state snapshot.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{Result, ShardError};
use crate::iterator::{EntryIter, MergeIterator, TombstoneFilter};

use super::segment::{self, Segment, SegmentMeta, SegmentWriter};

/// Immutable view of the on-disk segments
#[derive(Clone)]
pub struct SegmentStorage {
    /// Working directory
    dir: PathBuf,

    /// Open segments, ordered newest → oldest
    segments: Vec<Arc<Segment>>,

    /// Id for the next segment written (never reused)
    next_id: u64,
}

impl SegmentStorage {
    /// Load every valid segment from `dir`, creating the directory if needed.
    ///
    /// A segment that fails validation is logged and treated as absent. Only
    /// an unusable directory fails the load.
    pub fn load(dir: &Path) -> Result<Self> {
        if dir.exists() && !dir.is_dir() {
            return Err(ShardError::Storage(format!(
                "{} exists and is not a directory",
                dir.display()
            )));
        }
        fs::create_dir_all(dir)?;

        let mut ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if segment::is_temp_file(&path) {
                tracing::warn!(path = %path.display(), "removing segment left by an interrupted save");
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove temp segment");
                }
                continue;
            }
            if let Some(id) = segment::parse_segment_id(&path) {
                ids.push(id);
            }
        }

        // Newest first (highest id first)
        ids.sort_unstable_by(|a, b| b.cmp(a));
        let next_id = ids.first().map_or(1, |&id| id + 1);

        let mut segments = Vec::with_capacity(ids.len());
        for id in ids {
            let path = segment::segment_path(dir, id);
            match Segment::open(&path, id) {
                Ok(segment) => segments.push(Arc::new(segment)),
                Err(e) => {
                    tracing::warn!(segment_id = id, error = %e, "skipping unreadable segment");
                }
            }
        }

        // Inputs of a compaction that finished writing but crashed before
        // deleting them
        let replaced_through = segments
            .iter()
            .filter_map(|s| s.meta().replaces_through)
            .max();
        if let Some(through) = replaced_through {
            segments.retain(|s| {
                if s.id() > through {
                    return true;
                }
                tracing::info!(segment_id = s.id(), "removing segment superseded by compaction");
                if let Err(e) = fs::remove_file(s.path()) {
                    tracing::warn!(segment_id = s.id(), error = %e, "failed to remove superseded segment");
                }
                false
            });
        }

        tracing::info!(
            dir = %dir.display(),
            segments = segments.len(),
            next_id,
            "segment storage loaded"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
            next_id,
        })
    }

    /// One cursor per segment over `[from, to)`, newest first
    pub fn iterate(&self, from: &[u8], to: Option<&[u8]>) -> Vec<EntryIter> {
        self.segments
            .iter()
            .map(|s| Box::new(s.range(from, to)) as EntryIter)
            .collect()
    }

    /// First entry for `key` found newest → oldest, tombstones included
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        for segment in &self.segments {
            if let Some(entry) = segment.get(key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// True iff exactly one segment exists
    pub fn is_compacted(&self) -> bool {
        self.segments.len() == 1
    }

    /// Persist `entries` as a new segment and return the storage including it
    pub fn flush<I>(&self, entries: I) -> Result<SegmentStorage>
    where
        I: IntoIterator<Item = Result<Entry>>,
    {
        let id = self.next_id;
        let (path, meta) = write_segment(&self.dir, id, entries, None)?;
        let segment = Arc::new(Segment::open(&path, id)?);

        tracing::debug!(segment_id = id, entries = meta.entry_count, "segment written");

        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(segment);
        segments.extend(self.segments.iter().cloned());

        Ok(Self {
            dir: self.dir.clone(),
            segments,
            next_id: id + 1,
        })
    }

    /// Merge every segment into one, dropping tombstones.
    ///
    /// The inputs stay on disk; call `delete_files` on this (old) storage
    /// once the result is installed.
    pub fn compact(&self) -> Result<SegmentStorage> {
        let id = self.next_id;
        let replaces_through = self.segments.first().map_or(0, |s| s.id());

        let merged = TombstoneFilter::new(MergeIterator::new(self.iterate(&[], None)));
        let (path, meta) = write_segment(&self.dir, id, merged, Some(replaces_through))?;
        let segment = Arc::new(Segment::open(&path, id)?);

        tracing::info!(
            segment_id = id,
            inputs = self.segments.len(),
            entries = meta.entry_count,
            "segments compacted"
        );

        Ok(Self {
            dir: self.dir.clone(),
            segments: vec![segment],
            next_id: id + 1,
        })
    }

    /// Remove the files of every segment in this storage
    pub fn delete_files(&self) {
        for segment in &self.segments {
            if let Err(e) = fs::remove_file(segment.path()) {
                tracing::warn!(segment_id = segment.id(), error = %e, "failed to delete segment file");
            }
        }
    }

    /// Release all file handles; later reads fail
    pub fn close(&self) {
        for segment in &self.segments {
            segment.close();
        }
    }

    /// Get the number of segments
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    /// Get the next segment id (for testing/debugging)
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Get the working directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Write `entries` (ascending keys) as segment `id` in `dir`.
///
/// Used directly by the engine on close, where no storage value is needed.
pub fn write_segment<I>(
    dir: &Path,
    id: u64,
    entries: I,
    replaces_through: Option<u64>,
) -> Result<(PathBuf, SegmentMeta)>
where
    I: IntoIterator<Item = Result<Entry>>,
{
    let mut writer = SegmentWriter::create(dir, id)?;
    if let Some(through) = replaces_through {
        writer = writer.replaces_through(through);
    }

    for entry in entries {
        let added = entry.and_then(|entry| writer.add(&entry));
        if let Err(e) = added {
            writer.abandon();
            return Err(e);
        }
    }

    writer.finish()
}

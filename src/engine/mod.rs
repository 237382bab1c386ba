//! Engine Module
//!
//! The local storage engine that coordinates memtable, flushing buffer, and
//! segments.
//!
//! ## Responsibilities
//! - Serve point lookups and merged range scans
//! - Accept writes without blocking on I/O
//! - Hand full memtables to the background lane for flushing
//! - Compact all segments into one on request
//! - Persist what is left in memory on close
//!
//! ## Durability
//! Entries become durable only once their flush completes. A crash before
//! that loses them; a clean `close()` writes them out.

mod state;
mod worker;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::entry::Entry;
use crate::error::{Result, ShardError};
use crate::iterator::{EntryIter, MergeIterator, RangeIter, TombstoneFilter};
use crate::storage::segment::record_field_len;
use crate::storage::{write_segment, SegmentStorage};

pub use state::EngineState;
pub use worker::FlushTicket;

use worker::{Job, Worker};

/// State shared between the engine handle and its background lane
pub(crate) struct Shared {
    /// Current snapshot. Replaced only under the write guard; `upsert`
    /// inserts into the current memtable under the read guard.
    state: RwLock<Arc<EngineState>>,
}

/// The storage engine
///
/// ## Concurrency Model
///
/// - **Reads** (get/get_range): clone the current snapshot `Arc` and work on
///   it without further locking
/// - **Writes** (upsert): hold the *shared* state lock while inserting into
///   the memtable, which is itself safe for concurrent inserts. Writers never
///   block each other.
/// - **Snapshot swaps** (flush start/end, compaction end, close): take the
///   *exclusive* state lock, which waits out in-flight writers, then install
///   a new snapshot
/// - **Flush/compaction**: run one at a time on a single background thread
pub struct Engine {
    /// Engine configuration
    config: Config,

    shared: Arc<Shared>,

    /// Background lane for flush and compaction
    worker: Mutex<Worker>,

    /// Serializes close()
    close_lock: Mutex<()>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create the working directory
    /// 2. Load existing segments (damaged ones are skipped)
    /// 3. Start the background lane
    pub fn open(config: Config) -> Result<Self> {
        if config.flush_threshold_bytes == 0 {
            return Err(ShardError::Config(
                "flush_threshold_bytes must be positive".to_string(),
            ));
        }

        let segments = SegmentStorage::load(&config.data_dir)?;
        let segment_count = segments.segment_count();
        let state = EngineState::new(config.flush_threshold_bytes, segments);

        let shared = Arc::new(Shared {
            state: RwLock::new(Arc::new(state)),
        });
        let worker = Worker::spawn(Arc::clone(&shared))?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            segments = segment_count,
            flush_threshold = config.flush_threshold_bytes,
            "engine opened"
        );

        Ok(Self {
            config,
            shared,
            worker: Mutex::new(worker),
            close_lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Get the live entry for `key`
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. Flushing buffer
    /// 3. Segments (newest to oldest)
    ///
    /// A tombstone anywhere along the way ends the search with `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let state = self.snapshot()?;

        let mut found = state.memtable.get(key);
        if found.is_none() {
            if let Some(flushing) = &state.flushing {
                found = flushing.get(key);
            }
        }
        if found.is_none() {
            found = state.segments.get(key)?;
        }

        Ok(found.filter(|entry| !entry.is_tombstone()))
    }

    /// Live entries with keys in `[from, to)`, in key order.
    ///
    /// `from = None` starts at the smallest key; `to = None` runs to the end.
    pub fn get_range(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<RangeIter> {
        let state = self.snapshot()?;
        let from = from.unwrap_or(&[]);

        let mut sources: Vec<EntryIter> = Vec::with_capacity(state.segments.segment_count() + 2);
        sources.push(Box::new(state.memtable.range(from, to).map(Ok)));
        if let Some(flushing) = &state.flushing {
            sources.push(Box::new(flushing.range(from, to).map(Ok)));
        }
        sources.extend(state.segments.iterate(from, to));

        Ok(TombstoneFilter::new(MergeIterator::new(sources)))
    }

    /// Write an entry (value or tombstone) into the memtable.
    ///
    /// Never waits for I/O. When the write pushes the memtable over the
    /// flush threshold, a background flush is started. Keys or values too
    /// long for a segment record are rejected with `Validation`.
    pub fn upsert(&self, entry: Entry) -> Result<()> {
        let value_len = entry.value().map_or(0, |v| v.len());
        if record_field_len(entry.key().len()).is_none() || record_field_len(value_len).is_none() {
            return Err(ShardError::Validation(format!(
                "entry too large for a segment record (key {} bytes, value {} bytes)",
                entry.key().len(),
                value_len
            )));
        }

        let overflowed = {
            let state = self.shared.state.read();
            state.ensure_open()?;
            state.memtable.put(entry)
        };

        if overflowed {
            match self.start_flush() {
                // Nobody waits for an update-triggered flush
                Ok(_ticket) => {}
                Err(ShardError::FlushInProgress) => {
                    tracing::debug!("flush already running; memtable keeps growing");
                }
                Err(ShardError::EngineClosed) => return Err(ShardError::EngineClosed),
                Err(e) => {
                    tracing::warn!(error = %e, "could not start background flush");
                }
            }
        }

        Ok(())
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.upsert(Entry::new(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
        ))
    }

    /// Delete a key (writes a tombstone)
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.upsert(Entry::tombstone(Bytes::copy_from_slice(key)))
    }

    /// Start a background flush of the current memtable.
    ///
    /// Fails with `FlushInProgress` if a flush is already running. With an
    /// empty memtable the returned ticket is already complete.
    pub fn start_flush(&self) -> Result<FlushTicket> {
        {
            let mut state = self.shared.state.write();
            state.ensure_open()?;

            if state.is_flushing() {
                if state.flush_failed {
                    return Err(ShardError::Storage(
                        "an earlier flush failed; its entries are held in memory until close"
                            .to_string(),
                    ));
                }
                return Err(ShardError::FlushInProgress);
            }
            if state.memtable.is_empty() {
                return Ok(FlushTicket::completed());
            }

            tracing::debug!(
                bytes = state.memtable.size(),
                entries = state.memtable.entry_count(),
                "memtable handed to background flush"
            );
            *state = Arc::new(state.prepare_for_flush());
        }

        self.worker.lock().submit(Job::Flush)
    }

    /// Flush the memtable and wait until it is on disk.
    ///
    /// Tolerates a flush that is already running: waits for it, then flushes
    /// whatever the memtable holds by then.
    pub fn flush(&self) -> Result<()> {
        loop {
            match self.start_flush() {
                Ok(ticket) => return ticket.wait(),
                Err(ShardError::FlushInProgress) => {
                    let barrier = self.worker.lock().submit(Job::Barrier)?;
                    barrier.wait()?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Merge all segments into one and wait for it.
    ///
    /// No-op when there is a single segment and the memtable is empty.
    pub fn compact(&self) -> Result<()> {
        let state = self.snapshot()?;
        if state.memtable.is_empty() && state.segments.is_compacted() {
            return Ok(());
        }

        let ticket = self.worker.lock().submit(Job::Compact)?;
        ticket.wait()
    }

    /// Close the engine.
    ///
    /// Stops the background lane after its queued jobs, writes any buffered
    /// entries (memtable and a leftover flushing buffer) to a new segment,
    /// and releases segment files. Later calls return `EngineClosed`;
    /// closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _guard = self.close_lock.lock();

        {
            let mut state = self.shared.state.write();
            if state.closed {
                return Ok(());
            }
            *state = Arc::new(state.after_closed());
        }

        self.worker.lock().shutdown();

        let last = self.shared.state.read().clone();
        let result = persist_buffered(&last);
        last.segments.close();

        match &result {
            Ok(()) => tracing::info!(data_dir = %self.config.data_dir.display(), "engine closed"),
            Err(e) => tracing::error!(error = %e, "failed to persist buffered entries on close"),
        }
        result
    }

    fn snapshot(&self) -> Result<Arc<EngineState>> {
        let state = self.shared.state.read().clone();
        state.ensure_open()?;
        Ok(state)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the working directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.shared.state.read().memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.shared.state.read().memtable.entry_count()
    }

    /// Get the number of segments
    pub fn segment_count(&self) -> usize {
        self.shared.state.read().segments.segment_count()
    }

    /// Whether a flushing buffer is installed
    pub fn is_flushing(&self) -> bool {
        self.shared.state.read().is_flushing()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.read().closed
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "engine close on drop failed");
        }
    }
}

impl Shared {
    /// Background half of a flush: write the buffer, install the new segments
    fn flush_job(&self) -> Result<()> {
        let state = self.state.read().clone();
        let Some(flushing) = state.flushing.clone() else {
            return Ok(());
        };

        let started = Instant::now();
        match state.segments.flush(flushing.values().map(Ok)) {
            Ok(segments) => {
                let segment_id = segments.next_id() - 1;
                {
                    let mut current = self.state.write();
                    *current = Arc::new(current.after_flush(Arc::new(segments)));
                }
                tracing::info!(
                    segment_id,
                    entries = flushing.entry_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "memtable flushed"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "flush failed; closing segment storage");
                state.segments.close();
                let mut current = self.state.write();
                *current = Arc::new(current.after_failed_flush());
                Err(e)
            }
        }
    }

    /// Background half of a compaction
    fn compact_job(&self) -> Result<()> {
        let state = self.state.read().clone();
        let segments = &state.segments;

        // A lone segment is only worth rewriting to drop its tombstones
        let nothing_to_do = match segments.segments() {
            [] => true,
            [only] => only.meta().tombstone_count == 0,
            _ => false,
        };
        if nothing_to_do {
            tracing::debug!("compaction skipped; storage already compact");
            return Ok(());
        }

        let started = Instant::now();
        let compacted = segments.compact().map_err(|e| {
            tracing::error!(error = %e, "compaction failed");
            e
        })?;

        {
            let mut current = self.state.write();
            *current = Arc::new(current.after_compact(Arc::new(compacted)));
        }
        segments.delete_files();

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compaction installed"
        );
        Ok(())
    }
}

/// Write memtable + flushing buffer (memtable wins) as one last segment
fn persist_buffered(state: &EngineState) -> Result<()> {
    let flushing_empty = state.flushing.as_ref().map_or(true, |f| f.is_empty());
    if state.memtable.is_empty() && flushing_empty {
        return Ok(());
    }

    let mut sources: Vec<EntryIter> = vec![Box::new(state.memtable.values().map(Ok))];
    if let Some(flushing) = &state.flushing {
        sources.push(Box::new(flushing.values().map(Ok)));
    }

    // Tombstones are kept: older segments may still hold the deleted values
    let id = state.segments.next_id();
    let (_, meta) = write_segment(state.segments.dir(), id, MergeIterator::new(sources), None)?;
    tracing::info!(segment_id = id, entries = meta.entry_count, "buffered entries persisted");
    Ok(())
}

//! Engine State
//!
//! Immutable snapshot of everything a read needs. The engine never edits a
//! snapshot; it builds the next one and swaps the pointer.

use std::sync::Arc;

use crate::error::{Result, ShardError};
use crate::memtable::MemTable;
use crate::storage::SegmentStorage;

/// One generation of engine state
pub struct EngineState {
    /// Receives new writes (internally synchronized)
    pub memtable: Arc<MemTable>,

    /// Former memtable being written out; `Some` iff a flush is running or
    /// the last flush failed
    pub flushing: Option<Arc<MemTable>>,

    /// Segments on disk, newest first
    pub segments: Arc<SegmentStorage>,

    /// Set when the last flush failed; the buffer stays readable until close
    pub flush_failed: bool,

    pub closed: bool,
}

impl EngineState {
    pub fn new(flush_threshold: usize, segments: SegmentStorage) -> Self {
        Self {
            memtable: Arc::new(MemTable::new(flush_threshold)),
            flushing: None,
            segments: Arc::new(segments),
            flush_failed: false,
            closed: false,
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.is_some()
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ShardError::EngineClosed);
        }
        Ok(())
    }

    /// Memtable becomes the flushing buffer; writes go to a fresh memtable
    pub fn prepare_for_flush(&self) -> Self {
        Self {
            memtable: Arc::new(MemTable::new(self.memtable.flush_threshold())),
            flushing: Some(Arc::clone(&self.memtable)),
            segments: Arc::clone(&self.segments),
            flush_failed: false,
            closed: self.closed,
        }
    }

    /// Flushing buffer is on disk as part of `segments`
    pub fn after_flush(&self, segments: Arc<SegmentStorage>) -> Self {
        Self {
            memtable: Arc::clone(&self.memtable),
            flushing: None,
            segments,
            flush_failed: false,
            closed: self.closed,
        }
    }

    /// Keep the buffer readable, remember the failure
    pub fn after_failed_flush(&self) -> Self {
        Self {
            memtable: Arc::clone(&self.memtable),
            flushing: self.flushing.clone(),
            segments: Arc::clone(&self.segments),
            flush_failed: true,
            closed: self.closed,
        }
    }

    pub fn after_compact(&self, segments: Arc<SegmentStorage>) -> Self {
        Self {
            memtable: Arc::clone(&self.memtable),
            flushing: self.flushing.clone(),
            segments,
            flush_failed: self.flush_failed,
            closed: self.closed,
        }
    }

    pub fn after_closed(&self) -> Self {
        Self {
            memtable: Arc::clone(&self.memtable),
            flushing: self.flushing.clone(),
            segments: Arc::clone(&self.segments),
            flush_failed: self.flush_failed,
            closed: true,
        }
    }
}

//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Concurrent inserts from many writers (the engine only holds a shared lock)
//! - Track size for flush triggers
//! - Ordered iteration for segment creation and range scans
//!
//! ## Data Structure Choice
//! A `crossbeam_skiplist::SkipMap`:
//! - Ordered keys (required for segment generation)
//! - Lock-free inserts, so writers never contend on a table-wide lock
//! - Range cursors stay valid while other threads keep inserting

mod table;

pub use table::{MemTable, MemTableRange};

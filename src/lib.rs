//! # shardkv
//!
//! One node of a sharded key-value service:
//! - LSM-style local engine (memtable, background flush, sorted segments)
//! - Merged range scans with tombstone semantics
//! - Full compaction of all segments into one
//! - Rendezvous-hash routing of keys to their owning node
//! - Per-peer circuit breakers on forwarded requests
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 HTTP Server + Worker Pool                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    ClusterService                            │
//! │          (Router → local Engine or remote peer)             │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ self                             │ peer
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │     Engine      │                │ CircuitBreaker  │
//!   │ (RCU snapshots) │                │  + Transport    │
//!   └────────┬────────┘                └─────────────────┘
//!            │
//!   ┌────────┴─────────┬─────────────────┐
//!   ▼                  ▼                 ▼
//! ┌──────────┐   ┌──────────┐     ┌─────────────┐
//! │ MemTable │   │ Flushing │     │  Segments   │
//! │(SkipMap) │   │  Buffer  │     │ (on disk)   │
//! └──────────┘   └──────────┘     └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod entry;
pub mod error;

pub mod cluster;
pub mod engine;
pub mod iterator;
pub mod memtable;
pub mod network;
pub mod node;
pub mod protocol;
pub mod service;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use engine::Engine;
pub use entry::Entry;
pub use error::{Result, ShardError};
pub use node::Node;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of shardkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Configuration for shardkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ShardError};

/// Main configuration for a shardkv node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Working directory holding one file per segment
    pub data_dir: PathBuf,

    /// Memtable size (in bytes) above which a background flush is started
    pub flush_threshold_bytes: usize,

    // -------------------------------------------------------------------------
    // Cluster Configuration
    // -------------------------------------------------------------------------
    /// URL under which this node is listed in `cluster_urls`
    pub self_url: String,

    /// All cluster members, including this node. Order matters: on equal
    /// routing scores the member listed first owns the key.
    pub cluster_urls: Vec<String>,

    // -------------------------------------------------------------------------
    // Circuit Breaker Configuration
    // -------------------------------------------------------------------------
    /// Failures tolerated before a peer is blocked
    pub breaker_failure_threshold: u32,

    /// Cool-down before a blocked peer gets a probe request (milliseconds)
    pub breaker_retry_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Forwarding Configuration
    // -------------------------------------------------------------------------
    /// Connect timeout for forwarded requests (milliseconds)
    pub forward_connect_timeout_ms: u64,

    /// Read/write timeout for forwarded requests (milliseconds)
    pub forward_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Request worker threads
    pub worker_threads: usize,

    /// Pending requests allowed before new ones are rejected
    pub queue_capacity: usize,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./shardkv_data"),
            flush_threshold_bytes: 1024 * 1024, // 1 MB
            self_url: "http://127.0.0.1:19234".to_string(),
            cluster_urls: vec!["http://127.0.0.1:19234".to_string()],
            breaker_failure_threshold: 20,
            breaker_retry_timeout_ms: 1000,
            forward_connect_timeout_ms: 10_000,
            forward_timeout_ms: 10_000,
            listen_addr: "127.0.0.1:19234".to_string(),
            worker_threads: 3,
            queue_capacity: 32,
            max_connections: 1024,
            read_timeout_ms: 30_000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the settings a node cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold_bytes == 0 {
            return Err(ShardError::Config(
                "flush_threshold_bytes must be positive".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(ShardError::Config("worker_threads must be positive".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ShardError::Config("queue_capacity must be positive".to_string()));
        }
        if self.cluster_urls.is_empty() {
            return Err(ShardError::Config("cluster_urls is empty".to_string()));
        }
        if !self.cluster_urls.iter().any(|url| url == &self.self_url) {
            return Err(ShardError::Config(format!(
                "self_url {} is not listed in cluster_urls",
                self.self_url
            )));
        }
        Ok(())
    }

    pub fn breaker_retry_timeout(&self) -> Duration {
        Duration::from_millis(self.breaker_retry_timeout_ms)
    }

    pub fn forward_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_connect_timeout_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }
}

/// Convert a size given in KiB (as on the command line) to bytes
pub fn kib_to_bytes(kib: usize) -> Result<usize> {
    kib.checked_mul(1024)
        .ok_or_else(|| ShardError::Config(format!("{} KiB does not fit in usize bytes", kib)))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the working directory (root for all segments)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable flush threshold (in bytes)
    pub fn flush_threshold_bytes(mut self, size: usize) -> Self {
        self.config.flush_threshold_bytes = size;
        self
    }

    /// Set this node's own URL
    pub fn self_url(mut self, url: impl Into<String>) -> Self {
        self.config.self_url = url.into();
        self
    }

    /// Set the ordered list of cluster members
    pub fn cluster_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cluster_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of failures tolerated before a peer is blocked
    pub fn breaker_failure_threshold(mut self, count: u32) -> Self {
        self.config.breaker_failure_threshold = count;
        self
    }

    /// Set the breaker cool-down (in milliseconds)
    pub fn breaker_retry_timeout_ms(mut self, ms: u64) -> Self {
        self.config.breaker_retry_timeout_ms = ms;
        self
    }

    /// Set the connect timeout for forwarded requests (in milliseconds)
    pub fn forward_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.forward_connect_timeout_ms = ms;
        self
    }

    /// Set the I/O timeout for forwarded requests (in milliseconds)
    pub fn forward_timeout_ms(mut self, ms: u64) -> Self {
        self.config.forward_timeout_ms = ms;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the number of request worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the request queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

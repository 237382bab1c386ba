//! shardkv Server Binary
//!
//! Starts one cluster node: engine, router, and HTTP server.

use std::sync::atomic::Ordering;

use clap::Parser;
use shardkv::config::kib_to_bytes;
use shardkv::{Config, Node};
use tracing_subscriber::{fmt, EnvFilter};

/// shardkv node
#[derive(Parser, Debug)]
#[command(name = "shardkv-server")]
#[command(about = "One node of a sharded key-value store")]
#[command(version)]
struct Args {
    /// Working directory for segments
    #[arg(short, long, default_value = "./shardkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:19234")]
    listen: String,

    /// URL other nodes use to reach this one (defaults to http://<listen>)
    #[arg(long)]
    self_url: Option<String>,

    /// Cluster member URL, in routing order; repeat for each node.
    /// Defaults to this node alone.
    #[arg(short, long = "member")]
    members: Vec<String>,

    /// Memtable size in KB before a background flush
    #[arg(short = 'f', long, default_value = "1024")]
    flush_threshold_kb: usize,

    /// Request worker threads
    #[arg(short, long, default_value = "3")]
    workers: usize,

    /// Pending requests allowed before rejecting with 503
    #[arg(short, long, default_value = "32")]
    queue: usize,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let self_url = args
        .self_url
        .unwrap_or_else(|| format!("http://{}", args.listen));
    let members = if args.members.is_empty() {
        vec![self_url.clone()]
    } else {
        args.members
    };

    tracing::info!("shardkv server v{}", shardkv::VERSION);
    tracing::info!(data_dir = %args.data_dir, listen = %args.listen, self_url = %self_url, "starting");

    let flush_threshold_bytes = match kib_to_bytes(args.flush_threshold_kb) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Invalid --flush-threshold-kb: {}", e);
            std::process::exit(1);
        }
    };

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .self_url(self_url)
        .cluster_urls(members)
        .flush_threshold_bytes(flush_threshold_bytes)
        .worker_threads(args.workers)
        .queue_capacity(args.queue)
        .max_connections(args.max_connections)
        .build();

    let mut node = match Node::start(config) {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("Failed to start node: {}", e);
            std::process::exit(1);
        }
    };

    // Ctrl+C / SIGTERM stop the accept loop; join() then drains and closes
    let shutdown = node.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal, stopping node...");
        shutdown.store(true, Ordering::Release);
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        if let Err(e) = node.stop() {
            tracing::error!("Node stop failed: {}", e);
        }
        std::process::exit(1);
    }

    tracing::info!(addr = %node.local_addr(), "node ready");

    if let Err(e) = node.join() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

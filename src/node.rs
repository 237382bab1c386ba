//! Node Lifecycle
//!
//! Wires engine, service, worker pool, and server together and owns their
//! start/stop order.
//!
//! ## Stop Order
//! 1. Stop accepting connections
//! 2. Drain and stop the worker pool
//! 3. Close the engine (persists buffered entries)

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Result, ShardError};
use crate::network::{HttpTransport, Server, Transport, WorkerPool};
use crate::service::ClusterService;

/// A running shardkv node
pub struct Node {
    config: Config,
    engine: Arc<Engine>,
    pool: Arc<WorkerPool>,
    shutdown: Arc<AtomicBool>,
    server_thread: Option<JoinHandle<Result<()>>>,
    local_addr: SocketAddr,
}

impl Node {
    /// Start a node that forwards over HTTP
    pub fn start(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config));
        Self::start_with_transport(config, transport)
    }

    /// Start a node with a custom forwarding transport
    pub fn start_with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let engine = Arc::new(Engine::open(config.clone())?);
        let service = Arc::new(ClusterService::new(&config, Arc::clone(&engine), transport));
        let pool = Arc::new(WorkerPool::new(config.worker_threads, config.queue_capacity)?);

        let server = Server::bind(&config, service, Arc::clone(&pool))?;
        let local_addr = server.local_addr();
        let shutdown = server.shutdown_handle();

        let server_thread = thread::Builder::new()
            .name("shardkv-server".to_string())
            .spawn(move || server.run())?;

        tracing::info!(
            self_url = %config.self_url,
            addr = %local_addr,
            members = config.cluster_urls.len(),
            "node started"
        );

        Ok(Self {
            config,
            engine,
            pool,
            shutdown,
            server_thread: Some(server_thread),
            local_addr,
        })
    }

    /// Stop serving and close the engine. Safe to call more than once.
    pub fn stop(&mut self) -> Result<()> {
        let Some(server_thread) = self.server_thread.take() else {
            return Ok(());
        };

        self.shutdown.store(true, Ordering::Release);
        let served = server_thread
            .join()
            .map_err(|_| ShardError::Storage("server thread panicked".to_string()))
            .and_then(|result| result);

        self.pool.shutdown();
        let closed = self.engine.close();

        tracing::info!(self_url = %self.config.self_url, "node stopped");
        served.and(closed)
    }

    /// Flag that stops the server loop once set. A blocked `join` then
    /// drains the pool and closes the engine. Safe to set from a signal
    /// handler thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Block until the server loop exits, then drain the pool and close
    /// the engine
    pub fn join(mut self) -> Result<()> {
        if let Some(server_thread) = self.server_thread.take() {
            server_thread
                .join()
                .map_err(|_| ShardError::Storage("server thread panicked".to_string()))??;
        }
        self.pool.shutdown();
        self.engine.close()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "node stop on drop failed");
        }
    }
}

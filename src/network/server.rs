//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::{BufWriter, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::protocol::{write_response, Response, Status};
use crate::service::RequestHandler;

use super::connection::Connection;
use super::pool::WorkerPool;

/// Pause between polls of the non-blocking listener
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// HTTP server for a shardkv node
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    pool: Arc<WorkerPool>,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
    max_connections: usize,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
}

impl Server {
    /// Bind `config.listen_addr`; requests go to `handler` via `pool`
    pub fn bind(config: &Config, handler: Arc<dyn RequestHandler>, pool: Arc<WorkerPool>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        // Non-blocking so the accept loop can notice shutdown
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            handler,
            pool,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
            max_connections: config.max_connections,
            read_timeout_ms: config.read_timeout_ms,
            write_timeout_ms: config.write_timeout_ms,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Flag that stops the accept loop and open connections when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Accept connections until shutdown is signalled (blocking)
    pub fn run(&self) -> Result<()> {
        tracing::info!(addr = %self.local_addr, "server listening");

        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.accept(stream) {
                        tracing::warn!(peer = %addr, error = %e, "failed to set up connection");
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!(addr = %self.local_addr, "server stopped");
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn accept(&self, stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;

        if self.active_connections.load(Ordering::Acquire) >= self.max_connections {
            tracing::warn!(max = self.max_connections, "connection limit reached; rejecting");
            let mut writer = BufWriter::new(stream);
            write_response(
                &mut writer,
                &Response::text(Status::SERVICE_UNAVAILABLE, "too many connections"),
                false,
            )?;
            return Ok(());
        }

        let mut connection = Connection::new(
            stream,
            Arc::clone(&self.handler),
            Arc::clone(&self.pool),
            Arc::clone(&self.shutdown),
        )?;
        connection.set_timeouts(self.read_timeout_ms, self.write_timeout_ms)?;

        let active = Arc::clone(&self.active_connections);
        active.fetch_add(1, Ordering::AcqRel);

        let spawned = thread::Builder::new()
            .name("shardkv-conn".to_string())
            .spawn(move || {
                let _guard = ActiveGuard(active);
                if let Err(e) = connection.handle() {
                    tracing::debug!(peer = %connection.peer_addr(), error = %e, "connection closed with error");
                }
            });

        if let Err(e) = spawned {
            self.active_connections.fetch_sub(1, Ordering::AcqRel);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Releases a connection slot when its thread exits
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

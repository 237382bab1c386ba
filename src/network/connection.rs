//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel;

use crate::error::{Result, ShardError};
use crate::protocol::{read_request, write_response, Request, Response, Status};
use crate::service::RequestHandler;

use super::pool::{Submit, WorkerPool};

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    handler: Arc<dyn RequestHandler>,

    /// Requests run here, not on the connection thread
    pool: Arc<WorkerPool>,

    /// Set when the server stops; checked between requests
    shutdown: Arc<AtomicBool>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O
    pub fn new(
        stream: TcpStream,
        handler: Arc<dyn RequestHandler>,
        pool: Arc<WorkerPool>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            handler,
            pool,
            shutdown,
            peer_addr,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let read_stream = self.reader.get_ref();
        let write_stream = self.writer.get_ref();

        if read_ms > 0 {
            read_stream.set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            write_stream.set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads requests in a loop and sends responses.
    /// Returns when the client disconnects, asks to close, or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!(peer = %self.peer_addr, "connection established");

        while !self.shutdown.load(Ordering::Acquire) {
            let request = match read_request(&mut self.reader) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    tracing::debug!(peer = %self.peer_addr, "client disconnected");
                    return Ok(());
                }
                Err(ShardError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!(peer = %self.peer_addr, error = %e, "connection ended");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "malformed request");
                    let _ = self.send_response(&Response::text(Status::BAD_REQUEST, &e.to_string()), false);
                    return Err(e);
                }
            };

            let keep_alive = request.keep_alive;
            let response = self.dispatch(request);

            if let Err(e) = self.send_response(&response, keep_alive) {
                // Client gone before the response went out
                if let ShardError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(peer = %self.peer_addr, error = %e, "client left before response");
                        return Ok(());
                    }
                }
                tracing::warn!(peer = %self.peer_addr, error = %e, "failed to write response");
                return Err(e);
            }

            if !keep_alive {
                return Ok(());
            }
        }

        Ok(())
    }

    /// Run the request on the worker pool and wait for its response
    fn dispatch(&self, request: Request) -> Response {
        tracing::trace!(peer = %self.peer_addr, method = %request.method, uri = %request.target(), "request");

        let (reply, response) = channel::bounded(1);
        let handler = Arc::clone(&self.handler);

        let submitted = self.pool.try_execute(move || {
            let _ = reply.send(handler.handle(request));
        });

        match submitted {
            Submit::Accepted => response.recv().unwrap_or_else(|_| {
                Response::text(Status::INTERNAL_SERVER_ERROR, "request handler failed")
            }),
            Submit::Rejected => Response::text(Status::SERVICE_UNAVAILABLE, "server overloaded"),
        }
    }

    /// Send a response to the client
    fn send_response(&mut self, response: &Response, keep_alive: bool) -> Result<()> {
        write_response(&mut self.writer, response, keep_alive)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            // Read timeout (Windows reports TimedOut instead of WouldBlock)
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}

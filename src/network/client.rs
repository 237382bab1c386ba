//! Forwarding Transport
//!
//! Sends a request to another node and returns its response.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, ShardError};
use crate::protocol::{read_response, write_request, Request, Response};

/// Something that can deliver a request to a peer node
///
/// Any `Err` counts as a forwarding failure for the peer's circuit breaker.
pub trait Transport: Send + Sync {
    fn forward(&self, peer_url: &str, request: &Request) -> Result<Response>;
}

/// Blocking HTTP/1.1 transport, one connection per request
#[derive(Debug, Clone)]
pub struct HttpTransport {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            io_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.forward_connect_timeout(), config.forward_timeout())
    }

    fn send(&self, peer_url: &str, request: &Request) -> Result<Response> {
        let authority = authority(peer_url)?;
        let addr = authority
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ShardError::Forwarding(format!("{} resolved to no address", authority)))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;

        let mut outbound = request.clone();
        outbound.keep_alive = false;

        let mut writer = BufWriter::new(stream.try_clone()?);
        write_request(&mut writer, &outbound, authority)?;

        let mut reader = BufReader::new(stream);
        read_response(&mut reader)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Transport for HttpTransport {
    fn forward(&self, peer_url: &str, request: &Request) -> Result<Response> {
        self.send(peer_url, request).map_err(|e| match e {
            ShardError::Forwarding(_) => e,
            other => ShardError::Forwarding(format!("{}: {}", peer_url, other)),
        })
    }
}

/// `host:port` part of an `http://host:port[/...]` URL
fn authority(url: &str) -> Result<&str> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| ShardError::Forwarding(format!("unsupported peer URL: {}", url)))?;
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() {
        return Err(ShardError::Forwarding(format!("peer URL has no host: {}", url)));
    }
    Ok(authority)
}

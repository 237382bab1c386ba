//! Network Module
//!
//! HTTP serving and node-to-node forwarding.
//!
//! ## Architecture
//! - Single acceptor thread (`Server`)
//! - One thread per client connection (`Connection`), keep-alive
//! - Request handling on a bounded worker pool (`WorkerPool`), newest
//!   request first; a full queue answers 503
//! - Outbound forwards through a `Transport`

mod client;
mod connection;
mod pool;
mod server;

pub use client::{HttpTransport, Transport};
pub use connection::Connection;
pub use pool::{Submit, WorkerPool};
pub use server::Server;

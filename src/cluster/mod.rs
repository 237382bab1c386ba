//! Cluster Module
//!
//! Key ownership and peer health for a static cluster.
//!
//! ## Responsibilities
//! - Assign every key a deterministic owner (rendezvous hashing)
//! - Track each peer's health with a circuit breaker

pub mod hash;
mod breaker;
mod peers;
mod router;

pub use breaker::{BreakerState, CircuitBreaker};
pub use peers::PeerBreakers;
pub use router::{route, Router};

//! Protocol Module
//!
//! HTTP/1.1 messages exchanged with clients and between cluster nodes.
//!
//! ## Entity Endpoint
//! ```text
//! GET    /v0/entity?id=<key>          → 200 value | 404
//! PUT    /v0/entity?id=<key>  <body>  → 201
//! DELETE /v0/entity?id=<key>          → 202
//! ```
//!
//! ### Error Statuses
//! - 400: missing/blank id, unknown path, malformed request
//! - 405: other method on the entity endpoint
//! - 500: local engine failure
//! - 502: owner node unreachable
//! - 503: owner blocked by its circuit breaker, or request queue full

mod codec;
mod request;
mod response;

pub use codec::{read_request, read_response, write_request, write_response, MAX_BODY_SIZE};
pub use request::{percent_decode, percent_encode, Method, Request};
pub use response::{Response, Status};

/// Path of the entity endpoint
pub const ENTITY_PATH: &str = "/v0/entity";

/// Query parameter holding the key
pub const ID_PARAM: &str = "id";

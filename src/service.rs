//! Cluster Service
//!
//! Decides, per request, whether this node serves it or forwards it.
//!
//! ```text
//! request ──▶ path/id check ──▶ router ──┬─ self  ──▶ Engine
//!                                        └─ peer  ──▶ breaker ──▶ Transport
//! ```

use std::sync::Arc;

use bytes::Bytes;

use crate::cluster::{BreakerState, PeerBreakers, Router};
use crate::config::Config;
use crate::engine::Engine;
use crate::entry::Entry;
use crate::error::ShardError;
use crate::network::Transport;
use crate::protocol::{Method, Request, Response, Status, ENTITY_PATH, ID_PARAM};

/// Turns a request into a response; every outcome is a response
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: Request) -> Response;
}

/// Entity endpoint of one cluster node
pub struct ClusterService {
    engine: Arc<Engine>,
    router: Router,
    self_url: String,
    breakers: PeerBreakers,
    transport: Arc<dyn Transport>,
}

impl ClusterService {
    pub fn new(config: &Config, engine: Arc<Engine>, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine,
            router: Router::new(config.cluster_urls.iter().cloned()),
            self_url: config.self_url.clone(),
            breakers: PeerBreakers::from_config(config),
            transport,
        }
    }

    /// Serve an entity request against the local engine
    pub fn serve_local(&self, request: &Request, id: &str) -> Response {
        let key = id.as_bytes();

        let outcome = match request.method {
            Method::Get => self.engine.get(key).map(|found| match found {
                Some(entry) => Response::ok(entry.value().cloned().unwrap_or_default()),
                None => Response::empty(Status::NOT_FOUND),
            }),
            Method::Put => self
                .engine
                .upsert(Entry::new(Bytes::copy_from_slice(key), request.body.clone()))
                .map(|()| Response::empty(Status::CREATED)),
            Method::Delete => self
                .engine
                .delete(key)
                .map(|()| Response::empty(Status::ACCEPTED)),
            _ => Ok(Response::empty(Status::METHOD_NOT_ALLOWED)),
        };

        outcome.unwrap_or_else(|e| {
            tracing::error!(method = %request.method, error = %e, "local request failed");
            Response::text(Status::INTERNAL_SERVER_ERROR, &e.to_string())
        })
    }

    /// Forward `request` verbatim to `owner`, guarded by its breaker
    fn forward(&self, owner: &str, request: &Request) -> Response {
        if self.breakers.current_state(owner) == BreakerState::Blocking {
            let e = ShardError::PeerUnavailable(owner.to_string());
            tracing::warn!(peer = owner, "peer blocked by circuit breaker; failing fast");
            return Response::text(Status::SERVICE_UNAVAILABLE, &e.to_string());
        }

        match self.transport.forward(owner, request) {
            Ok(response) => {
                self.breakers.record_success(owner);
                response
            }
            Err(e) => {
                tracing::warn!(peer = owner, error = %e, "forward failed");
                self.breakers.record_failure(owner);
                Response::text(Status::BAD_GATEWAY, &e.to_string())
            }
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn breakers(&self) -> &PeerBreakers {
        &self.breakers
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }
}

impl RequestHandler for ClusterService {
    fn handle(&self, request: Request) -> Response {
        if request.path != ENTITY_PATH {
            return Response::empty(Status::BAD_REQUEST);
        }

        let id = match request.param(ID_PARAM) {
            Ok(Some(id)) if !id.trim().is_empty() => id,
            Ok(_) => {
                let e = ShardError::Validation("id parameter is missing or blank".to_string());
                return Response::text(Status::BAD_REQUEST, &e.to_string());
            }
            Err(e) => {
                tracing::debug!(error = %e, "rejecting undecodable id");
                return Response::text(Status::BAD_REQUEST, &e.to_string());
            }
        };

        match self.router.route(id.as_bytes()) {
            Some(owner) if owner != self.self_url => {
                tracing::debug!(id = %id, owner, "forwarding request");
                self.forward(owner, &request)
            }
            _ => {
                tracing::debug!(id = %id, method = %request.method, "serving locally");
                self.serve_local(&request, &id)
            }
        }
    }
}

//! Tests for ClusterService
//!
//! These tests verify:
//! - Local GET/PUT/DELETE status codes
//! - Request validation (path, id)
//! - Verbatim forwarding to the owning peer
//! - Circuit breaker behavior around a failing peer

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use shardkv::config::Config;
use shardkv::engine::Engine;
use shardkv::error::{Result, ShardError};
use shardkv::network::Transport;
use shardkv::protocol::{Method, Request, Response, Status};
use shardkv::service::{ClusterService, RequestHandler};

// =============================================================================
// Helper Functions
// =============================================================================

const SELF_URL: &str = "http://127.0.0.1:7001";
const PEER_URL: &str = "http://127.0.0.1:7002";
const THRESHOLD: u32 = 2;

/// Transport that records every call and answers from a script
struct FakeTransport {
    calls: Mutex<Vec<(String, Request)>>,
    reply: Mutex<Option<Response>>,
}

impl FakeTransport {
    fn answering(response: Response) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(Some(response)),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(None),
        })
    }

    fn set_reply(&self, reply: Option<Response>) {
        *self.reply.lock() = reply;
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Transport for FakeTransport {
    fn forward(&self, peer_url: &str, request: &Request) -> Result<Response> {
        self.calls.lock().push((peer_url.to_string(), request.clone()));
        self.reply
            .lock()
            .clone()
            .ok_or_else(|| ShardError::Forwarding(format!("{}: connection refused", peer_url)))
    }
}

fn setup_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .self_url(SELF_URL)
        .cluster_urls([SELF_URL, PEER_URL])
        .breaker_failure_threshold(THRESHOLD)
        .breaker_retry_timeout_ms(60_000)
        .build()
}

fn setup_service(transport: Arc<FakeTransport>) -> (TempDir, Arc<Engine>, ClusterService) {
    let dir = TempDir::new().unwrap();
    let config = setup_config(&dir);
    let engine = Arc::new(Engine::open(config.clone()).unwrap());
    let service = ClusterService::new(&config, Arc::clone(&engine), transport);
    (dir, engine, service)
}

/// First key `key_N` that routes to `owner`
fn key_owned_by(service: &ClusterService, owner: &str) -> String {
    (0..)
        .map(|i| format!("key_{}", i))
        .find(|k| service.router().route(k.as_bytes()) == Some(owner))
        .unwrap()
}

fn entity(method: Method, id: &str, body: &[u8]) -> Request {
    Request::new(
        method,
        &format!("/v0/entity?id={}", id),
        Bytes::copy_from_slice(body),
    )
}

// =============================================================================
// Local Serving Tests
// =============================================================================

#[test]
fn test_local_put_get_delete() {
    let transport = FakeTransport::failing();
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));
    let id = key_owned_by(&service, SELF_URL);

    let put = service.handle(entity(Method::Put, &id, b"value"));
    assert_eq!(put.status, Status::CREATED);
    assert!(put.body.is_empty());

    let get = service.handle(entity(Method::Get, &id, b""));
    assert_eq!(get.status, Status::OK);
    assert_eq!(get.body, Bytes::from_static(b"value"));

    let delete = service.handle(entity(Method::Delete, &id, b""));
    assert_eq!(delete.status, Status::ACCEPTED);

    let gone = service.handle(entity(Method::Get, &id, b""));
    assert_eq!(gone.status, Status::NOT_FOUND);

    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_local_get_missing_is_404() {
    let (_dir, _engine, service) = setup_service(FakeTransport::failing());
    let id = key_owned_by(&service, SELF_URL);

    let response = service.handle(entity(Method::Get, &id, b""));

    assert_eq!(response.status, Status::NOT_FOUND);
}

#[test]
fn test_local_put_empty_body() {
    let (_dir, engine, service) = setup_service(FakeTransport::failing());
    let id = key_owned_by(&service, SELF_URL);

    assert_eq!(
        service.handle(entity(Method::Put, &id, b"")).status,
        Status::CREATED
    );

    let get = service.handle(entity(Method::Get, &id, b""));
    assert_eq!(get.status, Status::OK);
    assert!(get.body.is_empty());
    assert!(engine.get(id.as_bytes()).unwrap().is_some());
}

#[test]
fn test_local_unsupported_method_is_405() {
    let (_dir, _engine, service) = setup_service(FakeTransport::failing());
    let id = key_owned_by(&service, SELF_URL);

    let post = service.handle(entity(Method::Post, &id, b"x"));
    let other = service.handle(entity(Method::Other("PATCH".to_string()), &id, b"x"));

    assert_eq!(post.status, Status::METHOD_NOT_ALLOWED);
    assert_eq!(other.status, Status::METHOD_NOT_ALLOWED);
}

#[test]
fn test_local_percent_encoded_id() {
    let (_dir, engine, service) = setup_service(FakeTransport::failing());
    // Find an id with a space that this node owns
    let id = (0..)
        .map(|i| format!("my key {}", i))
        .find(|k| service.router().route(k.as_bytes()) == Some(SELF_URL))
        .unwrap();
    let encoded = shardkv::protocol::percent_encode(&id);

    let put = service.handle(entity(Method::Put, &encoded, b"v"));

    assert_eq!(put.status, Status::CREATED);
    assert_eq!(
        engine.get(id.as_bytes()).unwrap().unwrap().value().unwrap(),
        &Bytes::from_static(b"v")
    );
}

#[test]
fn test_closed_engine_is_500() {
    let (_dir, engine, service) = setup_service(FakeTransport::failing());
    let id = key_owned_by(&service, SELF_URL);
    engine.close().unwrap();

    let response = service.handle(entity(Method::Get, &id, b""));

    assert_eq!(response.status, Status::INTERNAL_SERVER_ERROR);
    assert!(!response.body.is_empty());
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_wrong_path_is_400() {
    let transport = FakeTransport::failing();
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));

    let response = service.handle(Request::new(Method::Get, "/v1/thing?id=a", Bytes::new()));

    assert_eq!(response.status, Status::BAD_REQUEST);
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_missing_id_is_400() {
    let (_dir, _engine, service) = setup_service(FakeTransport::failing());

    let no_query = service.handle(Request::new(Method::Get, "/v0/entity", Bytes::new()));
    let other_param = service.handle(Request::new(Method::Get, "/v0/entity?key=a", Bytes::new()));

    assert_eq!(no_query.status, Status::BAD_REQUEST);
    assert_eq!(other_param.status, Status::BAD_REQUEST);
}

#[test]
fn test_blank_id_is_400() {
    let transport = FakeTransport::failing();
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));

    for target in ["/v0/entity?id=", "/v0/entity?id=%20%20", "/v0/entity?id=+"] {
        let response = service.handle(Request::new(Method::Put, target, Bytes::from_static(b"x")));
        assert_eq!(response.status, Status::BAD_REQUEST, "target {}", target);
    }
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_non_utf8_id_is_400() {
    let transport = FakeTransport::failing();
    let (_dir, engine, service) = setup_service(Arc::clone(&transport));

    for id in ["%FF", "%FE", "a%C3"] {
        let put = service.handle(entity(Method::Put, id, b"x"));
        assert_eq!(put.status, Status::BAD_REQUEST, "id {}", id);
        assert!(!put.body.is_empty());
    }

    // Nothing was stored under the replacement character
    assert!(engine.get("\u{fffd}".as_bytes()).unwrap().is_none());
    assert!(engine.get("a\u{fffd}".as_bytes()).unwrap().is_none());
    assert_eq!(transport.call_count(), 0);
}

// =============================================================================
// Forwarding Tests
// =============================================================================

#[test]
fn test_forward_relays_owner_response() {
    let reply = Response::new(Status::CREATED, Bytes::from_static(b"from peer"));
    let transport = FakeTransport::answering(reply.clone());
    let (_dir, engine, service) = setup_service(Arc::clone(&transport));
    let id = key_owned_by(&service, PEER_URL);
    let request = entity(Method::Put, &id, b"payload");

    let response = service.handle(request.clone());

    assert_eq!(response, reply);
    let calls = transport.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, PEER_URL);
    assert_eq!(calls[0].1, request);
    // Nothing was written locally
    assert!(engine.get(id.as_bytes()).unwrap().is_none());
}

#[test]
fn test_forward_relays_error_status_verbatim() {
    let transport = FakeTransport::answering(Response::empty(Status::NOT_FOUND));
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));
    let id = key_owned_by(&service, PEER_URL);

    let response = service.handle(entity(Method::Get, &id, b""));

    assert_eq!(response.status, Status::NOT_FOUND);
    // A relayed 404 is still a successful forward
    assert_eq!(service.breakers().get(PEER_URL).unwrap().failure_count(), 0);
}

#[test]
fn test_forward_unknown_method_to_owner() {
    let transport = FakeTransport::answering(Response::empty(Status::METHOD_NOT_ALLOWED));
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));
    let id = key_owned_by(&service, PEER_URL);

    let response = service.handle(entity(Method::Post, &id, b"x"));

    assert_eq!(response.status, Status::METHOD_NOT_ALLOWED);
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_transport_error_is_502() {
    let transport = FakeTransport::failing();
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));
    let id = key_owned_by(&service, PEER_URL);

    let response = service.handle(entity(Method::Get, &id, b""));

    assert_eq!(response.status, Status::BAD_GATEWAY);
    assert_eq!(service.breakers().get(PEER_URL).unwrap().failure_count(), 1);
}

// =============================================================================
// Circuit Breaker Tests
// =============================================================================

#[test]
fn test_breaker_trips_and_fails_fast() {
    let transport = FakeTransport::failing();
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));
    let id = key_owned_by(&service, PEER_URL);

    for _ in 0..=THRESHOLD {
        let response = service.handle(entity(Method::Get, &id, b""));
        assert_eq!(response.status, Status::BAD_GATEWAY);
    }
    let calls_before = transport.call_count();

    let response = service.handle(entity(Method::Get, &id, b""));

    assert_eq!(response.status, Status::SERVICE_UNAVAILABLE);
    assert_eq!(transport.call_count(), calls_before);
}

#[test]
fn test_blocked_peer_does_not_affect_local_keys() {
    let transport = FakeTransport::failing();
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));
    let remote = key_owned_by(&service, PEER_URL);
    let local = key_owned_by(&service, SELF_URL);

    for _ in 0..=THRESHOLD {
        service.handle(entity(Method::Get, &remote, b""));
    }

    let response = service.handle(entity(Method::Put, &local, b"v"));

    assert_eq!(response.status, Status::CREATED);
}

#[test]
fn test_success_before_trip_resets_failures() {
    let transport = FakeTransport::failing();
    let (_dir, _engine, service) = setup_service(Arc::clone(&transport));
    let id = key_owned_by(&service, PEER_URL);

    service.handle(entity(Method::Get, &id, b""));
    service.handle(entity(Method::Get, &id, b""));
    transport.set_reply(Some(Response::ok(Bytes::from_static(b"v"))));

    let response = service.handle(entity(Method::Get, &id, b""));

    assert_eq!(response.status, Status::OK);
    assert_eq!(service.breakers().get(PEER_URL).unwrap().failure_count(), 0);
}

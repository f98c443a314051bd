//! In-process HTTP server for integration tests.
//!
//! Serves one artifact body with or without Range support, plus variants
//! that stall, drop the connection once, or answer 503 once. Also serves a
//! registry document and a configuration hook endpoint. Every artifact
//! request is counted.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;

/// Bytes served before the stalling endpoint stops sending.
pub const STALL_AFTER: usize = 64 * 1024;

pub struct ServerState {
    pub body: Vec<u8>,
    pub honour_range: bool,
    pub release: Mutex<Option<serde_json::Value>>,
    pub requests: AtomicUsize,
    pub dropped_once: AtomicBool,
    pub refused_once: AtomicBool,
    pub ranges: Mutex<Vec<Option<String>>>,
    pub hook_calls: Mutex<Vec<serde_json::Value>>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

impl TestServer {
    /// Start a server for `body` on an ephemeral port.
    pub async fn start(body: Vec<u8>, honour_range: bool) -> Self {
        let state = Arc::new(ServerState {
            body,
            honour_range,
            release: Mutex::new(None),
            requests: AtomicUsize::new(0),
            dropped_once: AtomicBool::new(false),
            refused_once: AtomicBool::new(false),
            ranges: Mutex::new(Vec::new()),
            hook_calls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/files/:name", get(artifact))
            .route("/stall/:name", get(stalling))
            .route("/drop-once/:name", get(drop_once))
            .route("/busy-once/:name", get(busy_once))
            .route("/release", get(release))
            .route("/configure", post(configure))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn ranges(&self) -> Vec<Option<String>> {
        self.state.ranges.lock().unwrap().clone()
    }

    pub fn set_release(&self, release: serde_json::Value) {
        *self.state.release.lock().unwrap() = Some(release);
    }

    pub fn hook_calls(&self) -> Vec<serde_json::Value> {
        self.state.hook_calls.lock().unwrap().clone()
    }
}

/// Deterministic, non-repeating test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn range_start(range: Option<&str>) -> Option<usize> {
    range?
        .strip_prefix("bytes=")?
        .strip_suffix('-')?
        .parse()
        .ok()
}

/// Count the request and record its Range header.
fn record(state: &ServerState, headers: &HeaderMap) -> Option<String> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.ranges.lock().unwrap().push(range.clone());
    range
}

async fn artifact(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let range = record(&state, &headers);

    let body = &state.body;
    if state.honour_range {
        if let Some(start) = range_start(range.as_deref()) {
            if start >= body.len() {
                return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
            }
            let content_range = format!("bytes {}-{}/{}", start, body.len() - 1, body.len());
            return (
                StatusCode::PARTIAL_CONTENT,
                [(header::CONTENT_RANGE, content_range)],
                body[start..].to_vec(),
            )
                .into_response();
        }
    }

    body.clone().into_response()
}

async fn stalling(State(state): State<Arc<ServerState>>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.ranges.lock().unwrap().push(None);

    let first = Bytes::from(state.body[..STALL_AFTER.min(state.body.len())].to_vec());
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(first) })
        .chain(futures::stream::pending());

    (
        [(header::CONTENT_LENGTH, state.body.len().to_string())],
        Body::from_stream(stream),
    )
        .into_response()
}

/// First request: `STALL_AFTER` bytes, then the connection breaks.
/// Later requests behave like `/files`.
async fn drop_once(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if state.dropped_once.swap(true, Ordering::SeqCst) {
        return artifact(State(state), headers).await;
    }
    record(&state, &headers);

    let first = Bytes::from(state.body[..STALL_AFTER.min(state.body.len())].to_vec());
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(first) }).chain(
        futures::stream::once(async {
            // Let the first chunk reach the client before the connection goes.
            tokio::time::sleep(Duration::from_millis(200)).await;
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection dropped",
            ))
        }),
    );

    (
        [(header::CONTENT_LENGTH, state.body.len().to_string())],
        Body::from_stream(stream),
    )
        .into_response()
}

/// First request: 503. Later requests behave like `/files`.
async fn busy_once(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if state.refused_once.swap(true, Ordering::SeqCst) {
        return artifact(State(state), headers).await;
    }
    record(&state, &headers);
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}

async fn release(State(state): State<Arc<ServerState>>) -> Response {
    match state.release.lock().unwrap().clone() {
        Some(release) => Json(release).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn configure(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    state.hook_calls.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

//! HTTP API
//!
//! Thin hyper 1.x surface over the [`ReplicationCoordinator`].
//!
//! | Route                | Behaviour                                         |
//! |----------------------|---------------------------------------------------|
//! | `PUT /{key}`         | write the JSON record, 201 (or 307 to entry node) |
//! | `GET /{key}`         | read the record, 200 / 404 / 500                  |
//! | `GET /entries/count` | local key count                                   |
//! | `GET /health`        | liveness                                          |
//! | `GET /metrics`       | Prometheus text exposition                        |

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::record::Record;
use crate::error::Error;
use crate::replication::ReplicationCoordinator;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Shared state of every HTTP connection
#[derive(Debug)]
pub struct ApiState {
    pub coordinator: Arc<ReplicationCoordinator>,
    /// Redirect PUTs to the first node unless this is it
    pub redirect_writes: bool,
    /// HTTP port assumed for the entry node when redirecting
    pub http_port: u16,
}

// =============================================================================
// Server Loop
// =============================================================================

/// Accept HTTP connections until `shutdown` fires.
pub async fn serve(listener: TcpListener, state: Arc<ApiState>, shutdown: CancellationToken) {
    match listener.local_addr() {
        Ok(addr) => info!("HTTP server listening on {}", addr),
        Err(e) => warn!("HTTP listener address unavailable: {}", e),
    }

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, remote) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("HTTP accept error: {}", e);
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&state), req));
            let connection = http1::Builder::new().serve_connection(io, service);
            tokio::select! {
                _ = shutdown.cancelled() => debug!("Closing HTTP connection from {}", remote),
                result = connection => {
                    if let Err(e) = result {
                        error!("HTTP connection error from {}: {}", remote, e);
                    }
                }
            }
        });
    }
    debug!("HTTP server stopped");
}

// =============================================================================
// Routing
// =============================================================================

/// Route one request. Generic over the body so tests can drive it with
/// in-memory bodies.
pub async fn handle<B>(
    state: Arc<ApiState>,
    req: Request<B>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => respond(StatusCode::OK, TEXT, "ok"),
        (&Method::GET, "/metrics") => metrics(&state),
        (&Method::GET, "/entries/count") => {
            let count = state.coordinator.local_entry_count();
            respond(StatusCode::OK, JSON, count.to_string())
        }
        (&Method::GET, _) => match record_key(&path) {
            Some(key) => get_record(&state, &key).await,
            None => not_found(),
        },
        (&Method::PUT, _) => match record_key(&path) {
            Some(key) => put_record(&state, &path, &key, req.into_body()).await,
            None => not_found(),
        },
        _ => respond(StatusCode::METHOD_NOT_ALLOWED, TEXT, "method not allowed"),
    };
    Ok(response)
}

/// Percent-decoded key of a single-segment path
fn record_key(path: &str) -> Option<String> {
    let raw = path.strip_prefix('/')?;
    if raw.is_empty() || raw.contains('/') {
        return None;
    }
    urlencoding::decode(raw).ok().map(|k| k.into_owned())
}

async fn get_record(state: &ApiState, key: &str) -> Response<Full<Bytes>> {
    let record = match state.coordinator.read(key).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found(),
        Err(e @ Error::InvalidKey { .. }) => {
            return respond(StatusCode::BAD_REQUEST, TEXT, e.to_string())
        }
        Err(e) => return respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, e.to_string()),
    };

    let mut body = match serde_json::to_value(&record) {
        Ok(body) => body,
        Err(e) => return respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, e.to_string()),
    };
    if let Some(fields) = body.as_object_mut() {
        fields.insert(
            "modification_count".to_string(),
            json!(state.coordinator.local_modification_count(key)),
        );
        fields.insert("location_id".to_string(), json!(key));
    }
    respond(StatusCode::OK, JSON, body.to_string())
}

async fn put_record<B>(state: &ApiState, path: &str, key: &str, body: B) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let topology = state.coordinator.topology();
    if state.redirect_writes && !topology.is_entry_node() {
        let location = format!(
            "http://{}:{}{}",
            topology.entry_node().host(),
            state.http_port,
            path
        );
        debug!("Redirecting write of {} to {}", key, location);
        return match HeaderValue::from_str(&location) {
            Ok(value) => {
                let mut response = respond(StatusCode::TEMPORARY_REDIRECT, TEXT, "");
                response.headers_mut().insert(LOCATION, value);
                response
            }
            Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, e.to_string()),
        };
    }

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return respond(StatusCode::BAD_REQUEST, TEXT, e.to_string()),
    };
    let record: Record = match serde_json::from_slice(&bytes) {
        Ok(record) => record,
        Err(e) => return respond(StatusCode::BAD_REQUEST, TEXT, format!("Invalid record: {}", e)),
    };

    match state.coordinator.write(key, &record).await {
        Ok(report) => {
            let body = json!({
                "location_id": key,
                "modification_count": report.modification_count,
                "replicated": report.replicated.len(),
                "failed": report.failed.len(),
            });
            respond(StatusCode::CREATED, JSON, body.to_string())
        }
        Err(e @ (Error::InvalidKey { .. } | Error::EncodeFailure(_))) => {
            respond(StatusCode::BAD_REQUEST, TEXT, e.to_string())
        }
        Err(e) => {
            error!("Write of {} failed: {}", key, e);
            respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, e.to_string())
        }
    }
}

fn metrics(state: &ApiState) -> Response<Full<Bytes>> {
    match state.coordinator.metrics().render() {
        Ok((content_type, body)) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, e.to_string()),
    }
}

fn not_found() -> Response<Full<Bytes>> {
    respond(StatusCode::NOT_FOUND, TEXT, "not found")
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

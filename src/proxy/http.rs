//! Client-facing HTTP API of the proxy
//!
//! Routes:
//! - `/v1/:account` (any method) -> account controller
//! - `/health` -> liveness and ring summary
//! - `/metrics` -> Prometheus text
//!
//! Every route sits behind the metadata gate, which in turn sits inside the
//! request tracing middleware so stripped headers are logged under the
//! request's transaction id.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware,
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use bytes::Bytes;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::METRICS;
use crate::proxy::account::{AccountController, ProxyRequest};
use crate::proxy::gatekeeper::{gatekeeper_middleware, MetadataGate};

/// Account requests carry metadata in headers; bodies are tiny or empty.
pub const MAX_REQUEST_BODY: usize = 64 * 1024;

#[derive(Clone)]
pub struct ProxyState {
    pub accounts: Arc<AccountController>,
    pub ring_nodes: usize,
    pub replicas: usize,
}

pub fn create_router(state: ProxyState, gate: Arc<MetadataGate>) -> Router {
    Router::new()
        .route("/v1/:account", any(account_request))
        .route("/v1/:account/", any(account_request))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_tracing_middleware))
                .layer(middleware::from_fn_with_state(gate, gatekeeper_middleware))
                .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY)),
        )
}

async fn account_request(
    State(state): State<ProxyState>,
    Path(account): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = ProxyRequest {
        method,
        account,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };
    state.accounts.handle(request).await
}

async fn health(State(state): State<ProxyState>) -> impl IntoResponse {
    let settings = state.accounts.settings();
    axum::Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "ring_nodes": state.ring_nodes,
        "replicas": state.replicas,
        "allow_account_management": settings.allow_account_management,
        "account_autocreate": settings.account_autocreate,
    }))
}

async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.to_prometheus(),
    )
}

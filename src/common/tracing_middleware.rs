//! Structured logging and request tracing middleware
//!
//! This module provides:
//! - A transaction id for each request, forwarded to every replica
//! - Structured logging with tracing
//! - Request/response timing metrics

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::common::metrics::METRICS;

/// Header name for the transaction id
pub const TRANS_ID_HEADER: &str = "x-trans-id";

/// Generate a new unique transaction id
pub fn generate_trans_id() -> String {
    format!("tx{}", Uuid::new_v4().simple())
}

/// Transaction id carried by a request, if it has a usable one
pub fn trans_id(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(TRANS_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Middleware that assigns a transaction id and logs each request
pub async fn request_tracing_middleware(mut request: Request<Body>, next: Next) -> Response<Body> {
    let start = Instant::now();

    let trans_id = trans_id(request.headers()).unwrap_or_else(generate_trans_id);
    let trans_value = HeaderValue::from_str(&trans_id)
        .unwrap_or_else(|_| HeaderValue::from_static("tx-invalid"));
    request
        .headers_mut()
        .insert(TRANS_ID_HEADER, trans_value.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());

    let span = tracing::info_span!(
        "http_request",
        trans_id = %trans_id,
        method = %method,
        path = %path,
        client_ip = %client_ip,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    let duration = start.elapsed();
    let status = response.status();
    response.headers_mut().insert(TRANS_ID_HEADER, trans_value);
    METRICS.record_request(method.as_str(), duration, status.as_u16());

    let _guard = span.enter();
    if status.is_server_error() {
        warn!(
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Server error"
        );
    } else if status.is_client_error() {
        info!(
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Client error"
        );
    } else {
        info!(
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

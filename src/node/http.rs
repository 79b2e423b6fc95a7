//! Storage node HTTP API
//!
//! `/:device/:partition/:account`, the path the proxy's transport sends to.
//! Requests for a device this node does not serve get 507, like an
//! unmounted drive.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::node::store::{AccountRecord, AccountStore, MetadataUpdate, PutOutcome};

#[derive(Clone)]
pub struct NodeState {
    pub store: Arc<AccountStore>,
    pub device: String,
}

#[derive(Debug, Deserialize)]
struct ListingQuery {
    format: Option<String>,
}

pub fn create_router(state: NodeState) -> Router {
    Router::new()
        .route("/:device/:partition/:account", any(account_request))
        .route("/health", get(health))
        .layer(middleware::from_fn(request_tracing_middleware))
        .with_state(state)
}

async fn health(State(state): State<NodeState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "healthy",
        "device": state.device,
        "accounts": state.store.len(),
    }))
}

async fn account_request(
    State(state): State<NodeState>,
    Path((device, partition, account)): Path<(String, u64, String)>,
    Query(query): Query<ListingQuery>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if device != state.device {
        tracing::debug!("request for unknown device {}", device);
        return StatusCode::INSUFFICIENT_STORAGE.into_response();
    }
    tracing::debug!(partition, "{} account {}", method, account);

    let store = state.store.as_ref();
    match method {
        Method::HEAD => head(store, &account),
        Method::GET => listing(store, &account, query.format.as_deref()),
        Method::PUT => {
            let Some(timestamp) = request_timestamp(&headers) else {
                return missing_timestamp();
            };
            match store.put(&account, &timestamp, &MetadataUpdate::from_headers(&headers)) {
                PutOutcome::Created => StatusCode::CREATED.into_response(),
                PutOutcome::Existing => StatusCode::ACCEPTED.into_response(),
            }
        }
        Method::POST => {
            if request_timestamp(&headers).is_none() {
                return missing_timestamp();
            }
            if store.post(&account, &MetadataUpdate::from_headers(&headers)) {
                StatusCode::NO_CONTENT.into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
        Method::DELETE => {
            if request_timestamp(&headers).is_none() {
                return missing_timestamp();
            }
            if store.delete(&account) {
                StatusCode::NO_CONTENT.into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "DELETE, GET, HEAD, POST, PUT")],
        )
            .into_response(),
    }
}

fn request_timestamp(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-timestamp")
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.parse::<f64>().is_ok())
        .map(str::to_string)
}

fn missing_timestamp() -> Response {
    (StatusCode::BAD_REQUEST, "Missing timestamp").into_response()
}

fn head(store: &AccountStore, account: &str) -> Response {
    match store.get(account) {
        Some(record) => (StatusCode::NO_CONTENT, account_headers(&record)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Accounts on a development node never hold containers, so a listing is
/// always empty.
fn listing(store: &AccountStore, account: &str, format: Option<&str>) -> Response {
    let Some(record) = store.get(account) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut headers = account_headers(&record);
    if format == Some("json") {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        (StatusCode::OK, headers, "[]").into_response()
    } else {
        (StatusCode::NO_CONTENT, headers).into_response()
    }
}

fn account_headers(record: &AccountRecord) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let fixed = [
        ("x-account-container-count", "0"),
        ("x-account-object-count", "0"),
        ("x-account-bytes-used", "0"),
        ("x-timestamp", record.created_at.as_str()),
        ("x-put-timestamp", record.put_timestamp.as_str()),
        ("content-type", "text/plain; charset=utf-8"),
    ];
    let stored = record
        .metadata
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()));

    for (name, value) in fixed.into_iter().chain(stored) {
        let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) else {
            continue;
        };
        headers.insert(name, value);
    }
    headers
}

//! Account controller
//!
//! Per-method policy for account requests:
//! - GET/HEAD read from replicas; with autocreate a missing account reads as
//!   an empty placeholder, without touching the replicas again
//! - PUT/DELETE require account management to be enabled
//! - POST on a missing account, with autocreate, creates it and replays the
//!   POST exactly once
//! - every mutation invalidates the account's cache entry before dispatch

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::common::constraints::{check_metadata, check_name_length};
use crate::common::tracing_middleware::{generate_trans_id, trans_id, TRANS_ID_HEADER};
use crate::common::{encode_segment, timestamp_now, Error, ProxyConfig, Result, METRICS};
use crate::proxy::cache::{account_cache_key, invalidate, CacheStore};
use crate::proxy::replica::{QuorumDecision, ReplicaCoordinator, RequestEnvelope};
use crate::proxy::ring::{Partitioner, ReplicaNode};

/// Client headers forwarded to replicas on PUT and POST
const TRANSFER_PREFIXES: [&str; 4] = [
    "x-account-meta-",
    "x-remove-account-meta-",
    "x-account-sysmeta-",
    "x-remove-account-sysmeta-",
];

/// Replica headers that describe the replica connection, not the account
const HOP_BY_HOP: [HeaderName; 4] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    HeaderName::from_static("keep-alive"),
];

/// Feature flags fixed for the life of the process
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub allow_account_management: bool,
    pub account_autocreate: bool,
    pub max_account_name_length: usize,
}

impl From<&ProxyConfig> for AccountSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            allow_account_management: config.allow_account_management,
            account_autocreate: config.account_autocreate,
            max_account_name_length: config.max_account_name_length,
        }
    }
}

/// A client request addressed to one account
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Percent-decoded account name
    pub account: String,
    /// Request path as the client sent it
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response handed back through the gate to the client
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl From<QuorumDecision> for ProxyResponse {
    fn from(decision: QuorumDecision) -> Self {
        let mut headers = decision.headers;
        if !decision.synthesized {
            for name in &HOP_BY_HOP {
                headers.remove(name);
            }
        }
        Self {
            status: decision.status,
            headers,
            body: decision.body,
        }
    }
}

impl From<Error> for ProxyResponse {
    fn from(err: Error) -> Self {
        let status = err.to_http_status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", err);
        }
        let mut headers = HeaderMap::new();
        if let Error::MethodNotAllowed { allowed } = &err {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                headers.insert(header::ALLOW, value);
            }
        }
        Self {
            status,
            headers,
            body: Bytes::from(err.client_body()),
        }
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Path of an account below a node's device/partition prefix
pub fn account_path(account: &str) -> String {
    format!("/{}", encode_segment(account))
}

/// Response for a missing account when autocreate is on
pub fn placeholder_account() -> QuorumDecision {
    let mut headers = HeaderMap::new();
    let fields = [
        ("content-length", "0".to_string()),
        ("accept-ranges", "bytes".to_string()),
        ("content-type", "text/plain; charset=utf-8".to_string()),
        ("x-timestamp", timestamp_now()),
        ("x-account-bytes-used", "0".to_string()),
        ("x-account-container-count", "0".to_string()),
        ("x-account-object-count", "0".to_string()),
    ];
    for (name, value) in fields {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
    QuorumDecision::synthesized(StatusCode::NO_CONTENT, headers)
}

fn is_transfer_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name == header::CONTENT_TYPE.as_str() || TRANSFER_PREFIXES.iter().any(|p| name.starts_with(p))
}

pub struct AccountController {
    settings: AccountSettings,
    ring: Arc<dyn Partitioner>,
    coordinator: Arc<ReplicaCoordinator>,
    cache: Arc<dyn CacheStore>,
}

impl AccountController {
    pub fn new(
        settings: AccountSettings,
        ring: Arc<dyn Partitioner>,
        coordinator: Arc<ReplicaCoordinator>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            settings,
            ring,
            coordinator,
            cache,
        }
    }

    pub fn settings(&self) -> &AccountSettings {
        &self.settings
    }

    /// Methods a client may use on accounts, sorted
    pub fn allowed_methods(&self) -> Vec<&'static str> {
        if self.settings.allow_account_management {
            vec!["DELETE", "GET", "HEAD", "POST", "PUT"]
        } else {
            vec!["GET", "HEAD", "POST"]
        }
    }

    pub async fn handle(&self, req: ProxyRequest) -> ProxyResponse {
        let result = match req.method {
            Method::GET | Method::HEAD => self.get_or_head(&req).await,
            Method::PUT => self.put(&req).await,
            Method::POST => self.post(&req).await,
            Method::DELETE => self.delete(&req).await,
            _ => Err(self.method_not_allowed()),
        };
        result.unwrap_or_else(ProxyResponse::from)
    }

    async fn get_or_head(&self, req: &ProxyRequest) -> Result<ProxyResponse> {
        self.check_name(&req.account)?;
        let (partition, nodes) = self.ring.resolve(&req.account)?;

        let mut path = account_path(&req.account);
        if let Some(query) = req.query.as_deref().filter(|q| !q.is_empty()) {
            path = format!("{}?{}", path, query);
        }
        let envelope = RequestEnvelope::new(req.method.clone(), partition, path)
            .with_headers(self.request_headers(req, false));

        let decision = self.coordinator.execute(&envelope, &nodes).await?;
        if decision.status == StatusCode::NOT_FOUND && self.settings.account_autocreate {
            METRICS.autocreate_synthesized.inc();
            tracing::debug!("account {} not found; answering with placeholder", req.account);
            return Ok(placeholder_account().into());
        }
        Ok(decision.into())
    }

    async fn put(&self, req: &ProxyRequest) -> Result<ProxyResponse> {
        if !self.settings.allow_account_management {
            return Err(self.method_not_allowed());
        }
        check_metadata(&req.headers, "account")?;
        self.check_name(&req.account)?;
        let (partition, nodes) = self.ring.resolve(&req.account)?;

        let envelope = RequestEnvelope::new(Method::PUT, partition, account_path(&req.account))
            .with_headers(self.request_headers(req, true));
        invalidate(self.cache.as_ref(), &account_cache_key(&req.account));

        Ok(self.coordinator.execute(&envelope, &nodes).await?.into())
    }

    async fn post(&self, req: &ProxyRequest) -> Result<ProxyResponse> {
        self.check_name(&req.account)?;
        check_metadata(&req.headers, "account")?;
        let (partition, nodes) = self.ring.resolve(&req.account)?;

        let envelope = RequestEnvelope::new(Method::POST, partition, account_path(&req.account))
            .with_headers(self.request_headers(req, true));
        invalidate(self.cache.as_ref(), &account_cache_key(&req.account));

        let decision = self.coordinator.execute(&envelope, &nodes).await?;
        if decision.status == StatusCode::NOT_FOUND && self.settings.account_autocreate {
            return Ok(self.create_and_replay(req, &envelope, &nodes).await?.into());
        }
        Ok(decision.into())
    }

    async fn delete(&self, req: &ProxyRequest) -> Result<ProxyResponse> {
        // A query string here usually means a container/object request that
        // some middleware should have handled.
        if req.query.as_deref().is_some_and(|q| !q.is_empty()) {
            return Err(Error::BadRequest(
                "Query string not allowed on account DELETE".into(),
            ));
        }
        if !self.settings.allow_account_management {
            return Err(self.method_not_allowed());
        }
        self.check_name(&req.account)?;
        let (partition, nodes) = self.ring.resolve(&req.account)?;

        let envelope = RequestEnvelope::new(Method::DELETE, partition, account_path(&req.account))
            .with_headers(self.request_headers(req, false));
        invalidate(self.cache.as_ref(), &account_cache_key(&req.account));

        Ok(self.coordinator.execute(&envelope, &nodes).await?.into())
    }

    /// Autocreate saga for POST: create the account, then send the original
    /// POST once more. Both steps are create-if-absent/overwrite on the
    /// replicas, so repeating the whole saga is harmless. The replayed
    /// decision is final even if it is still a 404.
    async fn create_and_replay(
        &self,
        req: &ProxyRequest,
        envelope: &RequestEnvelope,
        nodes: &[ReplicaNode],
    ) -> Result<QuorumDecision> {
        self.autocreate_account(req, envelope.partition, nodes).await?;
        self.coordinator.execute(envelope, nodes).await
    }

    async fn autocreate_account(
        &self,
        req: &ProxyRequest,
        partition: u64,
        nodes: &[ReplicaNode],
    ) -> Result<()> {
        let envelope = RequestEnvelope::new(Method::PUT, partition, account_path(&req.account))
            .with_headers(self.request_headers(req, false));
        invalidate(self.cache.as_ref(), &account_cache_key(&req.account));
        METRICS.autocreate_implicit.inc();

        let decision = self.coordinator.execute(&envelope, nodes).await?;
        if decision.is_success() {
            tracing::info!("autocreate account {}", req.account);
        } else {
            tracing::warn!(
                "could not autocreate account {} (status {})",
                req.account,
                decision.status.as_u16()
            );
        }
        Ok(())
    }

    fn check_name(&self, account: &str) -> Result<()> {
        check_name_length("Account", account, self.settings.max_account_name_length)
    }

    fn method_not_allowed(&self) -> Error {
        Error::MethodNotAllowed {
            allowed: self.allowed_methods(),
        }
    }

    /// Headers sent to every replica: transfer headers copied from the
    /// client (PUT/POST) plus the proxy's own, which always win.
    fn request_headers(&self, req: &ProxyRequest, transfer: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if transfer {
            for (name, value) in &req.headers {
                if is_transfer_header(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        let trans = trans_id(&req.headers).unwrap_or_else(generate_trans_id);
        let internal = [
            (HeaderName::from_static("x-timestamp"), timestamp_now()),
            (HeaderName::from_static(TRANS_ID_HEADER), trans),
            (header::REFERER, format!("{} {}", req.method, req.path)),
            (header::USER_AGENT, format!("proxy-server {}", std::process::id())),
        ];
        for (name, value) in internal {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(_) => tracing::debug!("dropping unrepresentable {} header", name),
            }
        }
        headers
    }
}

//! System metadata gatekeeper
//!
//! Headers in the system-metadata namespace (`x-account-sysmeta-*`,
//! `x-container-sysmeta-*`, `x-object-sysmeta-*`) belong to the cluster.
//! Clients may not set them and must never see them. The gate strips them
//! from every inbound request before any handler runs and from every
//! outbound response before it leaves the proxy.
//!
//! Both directions share one [`ExclusionSet`]. Supporting a new resource
//! class means adding its server type to [`SYSMETA_SERVER_TYPES`].

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, Request, Response},
    middleware::Next,
};
use regex::{Regex, RegexBuilder};

use crate::common::{Result, METRICS};

/// Resource classes that own a system-metadata namespace
pub const SYSMETA_SERVER_TYPES: [&str; 3] = ["account", "container", "object"];

/// Header prefix for a resource class's system metadata
pub fn sys_meta_prefix(server_type: &str) -> String {
    format!("x-{}-sysmeta-", server_type.to_lowercase())
}

/// Case-insensitive header name patterns, compiled once
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    patterns: Vec<Regex>,
}

impl ExclusionSet {
    /// Build from regex sources. Each pattern is anchored at the start of
    /// the header name.
    pub fn new<S: AsRef<str>>(sources: &[S]) -> Result<Self> {
        let patterns = sources
            .iter()
            .map(|source| {
                let source = source.as_ref();
                let anchored = if source.starts_with('^') {
                    source.to_string()
                } else {
                    format!("^{}", source)
                };
                RegexBuilder::new(&anchored)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        crate::Error::InvalidConfig(format!("bad header pattern {}: {}", source, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// The system-metadata prefixes of every resource class
    pub fn system_metadata() -> Result<Self> {
        let sources: Vec<String> = SYSMETA_SERVER_TYPES
            .iter()
            .map(|t| regex::escape(&sys_meta_prefix(t)))
            .collect();
        Self::new(&sources)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Remove every matching header, returning the removed names
    pub fn remove_from(&self, headers: &mut HeaderMap) -> Vec<String> {
        let doomed: Vec<HeaderName> = headers
            .keys()
            .filter(|name| self.matches(name.as_str()))
            .cloned()
            .collect();
        for name in &doomed {
            headers.remove(name);
        }
        doomed.into_iter().map(|n| n.as_str().to_string()).collect()
    }
}

/// Bidirectional header filter for the client/cluster boundary
#[derive(Debug, Clone)]
pub struct MetadataGate {
    inbound: ExclusionSet,
    outbound: ExclusionSet,
}

impl MetadataGate {
    pub fn new() -> Result<Self> {
        let exclusions = ExclusionSet::system_metadata()?;
        Ok(Self {
            inbound: exclusions.clone(),
            outbound: exclusions,
        })
    }

    pub fn filter_inbound(&self, headers: &mut HeaderMap) -> Vec<String> {
        let removed = self.inbound.remove_from(headers);
        if !removed.is_empty() {
            METRICS.headers_removed_inbound.add(removed.len() as u64);
            tracing::debug!("removed request headers: {:?}", removed);
        }
        removed
    }

    pub fn filter_outbound(&self, headers: &mut HeaderMap) -> Vec<String> {
        let removed = self.outbound.remove_from(headers);
        if !removed.is_empty() {
            METRICS.headers_removed_outbound.add(removed.len() as u64);
            tracing::debug!("removed response headers: {:?}", removed);
        }
        removed
    }
}

/// Middleware applying the gate to a request and its response
pub async fn gatekeeper_middleware(
    State(gate): State<Arc<MetadataGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response<Body> {
    gate.filter_inbound(request.headers_mut());
    let mut response = next.run(request).await;
    gate.filter_outbound(response.headers_mut());
    response
}

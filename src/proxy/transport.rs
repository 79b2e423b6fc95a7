//! Transport to storage nodes
//!
//! A transport turns every remote failure into an unreachable outcome; the
//! coordinator never sees an error from a node.

use std::time::Duration;

use async_trait::async_trait;

use crate::common::{encode_segment, Result};
use crate::proxy::replica::{ReplicaOutcome, RequestEnvelope};
use crate::proxy::ring::ReplicaNode;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, node: &ReplicaNode, envelope: &RequestEnvelope, timeout: Duration) -> ReplicaOutcome;
}

/// URL of `envelope`'s resource on `node`
pub fn node_url(node: &ReplicaNode, envelope: &RequestEnvelope) -> String {
    format!(
        "http://{}/{}/{}{}",
        node.address,
        encode_segment(&node.device),
        envelope.partition,
        envelope.path
    )
}

/// HTTP transport backed by a pooled reqwest client
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, node: &ReplicaNode, envelope: &RequestEnvelope, timeout: Duration) -> ReplicaOutcome {
        let url = node_url(node, envelope);
        let mut request = self
            .client
            .request(envelope.method.clone(), &url)
            .headers(envelope.headers.clone())
            .timeout(timeout);
        if !envelope.body.is_empty() {
            request = request.body(envelope.body.clone());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(node = node.id, "{} {} failed: {}", envelope.method, url, e);
                return ReplicaOutcome::unreachable(node.id);
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        match response.bytes().await {
            Ok(body) => ReplicaOutcome::from_response(node.id, status, headers, body),
            Err(e) => {
                tracing::debug!(node = node.id, "reading body from {} failed: {}", url, e);
                ReplicaOutcome::unreachable(node.id)
            }
        }
    }
}

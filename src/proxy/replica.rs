//! Replica fan-out and quorum reduction
//!
//! Reads (GET/HEAD) walk the replicas in ring order and stop at the first
//! success. Writes go to every replica at once and succeed only when a
//! strict majority succeeds. Individual node failures never surface as
//! errors: a node that times out or cannot be reached becomes an
//! [`OutcomeClass::Unreachable`] outcome and is weighed like any other.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};

use crate::common::{Result, METRICS};
use crate::proxy::ring::ReplicaNode;
use crate::proxy::transport::Transport;

/// Per-replica request, built once and sent unchanged to every node
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub method: Method,
    pub partition: u64,
    /// Resource path below the node's device/partition prefix, e.g. `/AUTH_test`
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestEnvelope {
    pub fn new(method: Method, partition: u64, path: impl Into<String>) -> Self {
        Self {
            method,
            partition,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Success,
    ClientError,
    ServerError,
    Unreachable,
}

impl OutcomeClass {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() {
            OutcomeClass::Success
        } else if status.is_server_error() {
            OutcomeClass::ServerError
        } else {
            OutcomeClass::ClientError
        }
    }
}

/// What one node answered
#[derive(Debug, Clone)]
pub struct ReplicaOutcome {
    pub node_id: u64,
    pub class: OutcomeClass,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReplicaOutcome {
    pub fn from_response(node_id: u64, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            node_id,
            class: OutcomeClass::from_status(status),
            status,
            headers,
            body,
        }
    }

    pub fn unreachable(node_id: u64) -> Self {
        Self {
            node_id,
            class: OutcomeClass::Unreachable,
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// The single outcome chosen to represent a replica group
#[derive(Debug, Clone)]
pub struct QuorumDecision {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Produced by the proxy rather than observed on a replica
    pub synthesized: bool,
}

impl QuorumDecision {
    fn observed(outcome: ReplicaOutcome) -> Self {
        Self {
            status: outcome.status,
            headers: outcome.headers,
            body: outcome.body,
            synthesized: false,
        }
    }

    pub fn synthesized(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            body: Bytes::new(),
            synthesized: true,
        }
    }

    /// No replica gave a usable answer
    pub fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            synthesized: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Successes needed for a write to be acknowledged
pub fn quorum_size(replicas: usize) -> usize {
    replicas / 2 + 1
}

/// Read reduction over ring-ordered outcomes.
///
/// The first success wins. Otherwise a client error (a 404 included) beats
/// a server error, which beats an unreachable node; within a class the
/// earliest node in ring order wins.
pub fn reduce_read(outcomes: Vec<ReplicaOutcome>) -> QuorumDecision {
    [
        OutcomeClass::Success,
        OutcomeClass::ClientError,
        OutcomeClass::ServerError,
    ]
    .into_iter()
    .find_map(|class| outcomes.iter().position(|o| o.class == class))
    .map(|idx| QuorumDecision::observed(outcomes[idx].clone()))
    .unwrap_or_else(QuorumDecision::unavailable)
}

/// Write reduction over ring-ordered outcomes.
///
/// A strict majority of successes yields the most common success status.
/// Without one, the most common client error is returned if any node gave
/// one, else the highest server error, else 503.
pub fn reduce_write(outcomes: Vec<ReplicaOutcome>) -> QuorumDecision {
    let successes = outcomes
        .iter()
        .filter(|o| o.class == OutcomeClass::Success)
        .count();

    let chosen = if successes >= quorum_size(outcomes.len()) {
        most_common(&outcomes, OutcomeClass::Success)
    } else if let Some(idx) = most_common(&outcomes, OutcomeClass::ClientError) {
        Some(idx)
    } else {
        highest(&outcomes, OutcomeClass::ServerError)
    };

    match chosen {
        Some(idx) => QuorumDecision::observed(outcomes[idx].clone()),
        None => QuorumDecision::unavailable(),
    }
}

/// Index of the first outcome carrying the most frequent status of `class`
fn most_common(outcomes: &[ReplicaOutcome], class: OutcomeClass) -> Option<usize> {
    let mut tally: Vec<(StatusCode, usize, usize)> = Vec::new();
    for (idx, outcome) in outcomes.iter().enumerate() {
        if outcome.class != class {
            continue;
        }
        match tally.iter_mut().find(|(status, _, _)| *status == outcome.status) {
            Some(entry) => entry.1 += 1,
            None => tally.push((outcome.status, 1, idx)),
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (_, count, first) in tally {
        if best.map_or(true, |(best_count, _)| count > best_count) {
            best = Some((count, first));
        }
    }
    best.map(|(_, idx)| idx)
}

/// Index of the first outcome carrying the highest status of `class`
fn highest(outcomes: &[ReplicaOutcome], class: OutcomeClass) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, outcome) in outcomes.iter().enumerate() {
        if outcome.class != class {
            continue;
        }
        if best.map_or(true, |b| outcome.status > outcomes[b].status) {
            best = Some(idx);
        }
    }
    best
}

/// Executes envelopes against replica sets
pub struct ReplicaCoordinator {
    transport: Arc<dyn Transport>,
    node_timeout: Duration,
    read_concurrency: usize,
}

impl ReplicaCoordinator {
    pub fn new(transport: Arc<dyn Transport>, node_timeout: Duration, read_concurrency: usize) -> Self {
        Self {
            transport,
            node_timeout,
            read_concurrency: read_concurrency.max(1),
        }
    }

    /// Run `envelope` against `nodes` (in ring order) and reduce the answers.
    ///
    /// Fails only when `nodes` is empty, which means the ring is
    /// misconfigured.
    pub async fn execute(&self, envelope: &RequestEnvelope, nodes: &[ReplicaNode]) -> Result<QuorumDecision> {
        if nodes.is_empty() {
            return Err(crate::Error::NoReplicas(envelope.partition));
        }

        if envelope.is_read() {
            Ok(self.read(envelope, nodes).await)
        } else {
            Ok(self.write(envelope, nodes).await)
        }
    }

    async fn read(&self, envelope: &RequestEnvelope, nodes: &[ReplicaNode]) -> QuorumDecision {
        // Futures are built up front and only polled by the stream, so ring
        // order and early exit still hold.
        let calls: Vec<_> = nodes.iter().map(|node| self.call(node, envelope)).collect();
        let mut scan = stream::iter(calls).buffered(self.read_concurrency);

        let mut failures = Vec::new();
        while let Some(outcome) = scan.next().await {
            if outcome.class == OutcomeClass::Success {
                // Dropping the stream abandons calls still in flight.
                return QuorumDecision::observed(outcome);
            }
            failures.push(outcome);
        }
        reduce_read(failures)
    }

    async fn write(&self, envelope: &RequestEnvelope, nodes: &[ReplicaNode]) -> QuorumDecision {
        let outcomes = join_all(nodes.iter().map(|node| self.call(node, envelope))).await;
        let replicas = outcomes.len();
        let successes = outcomes
            .iter()
            .filter(|o| o.class == OutcomeClass::Success)
            .count();

        let decision = reduce_write(outcomes);
        if successes < quorum_size(replicas) {
            METRICS.quorum_failures.inc();
            tracing::warn!(
                method = %envelope.method,
                partition = envelope.partition,
                successes,
                replicas,
                status = decision.status.as_u16(),
                "write quorum not reached"
            );
        }
        decision
    }

    async fn call(&self, node: &ReplicaNode, envelope: &RequestEnvelope) -> ReplicaOutcome {
        let send = self.transport.send(node, envelope, self.node_timeout);
        let outcome = match tokio::time::timeout(self.node_timeout, send).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!(node = node.id, "replica timed out after {:?}", self.node_timeout);
                ReplicaOutcome::unreachable(node.id)
            }
        };

        METRICS.record_outcome(outcome.class);
        if outcome.class != OutcomeClass::Success {
            tracing::debug!(
                method = %envelope.method,
                partition = envelope.partition,
                node = node.id,
                status = outcome.status.as_u16(),
                class = ?outcome.class,
                "replica did not succeed"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::transport::mock::MockTransport;

    fn outcome(node_id: u64, status: u16) -> ReplicaOutcome {
        ReplicaOutcome::from_response(
            node_id,
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        )
    }

    fn nodes(n: u64) -> Vec<ReplicaNode> {
        (1..=n)
            .map(|id| ReplicaNode {
                id,
                address: format!("10.0.0.{}:6002", id),
                device: "sda1".into(),
            })
            .collect()
    }

    #[test]
    fn test_outcome_class() {
        assert_eq!(OutcomeClass::from_status(StatusCode::NO_CONTENT), OutcomeClass::Success);
        assert_eq!(OutcomeClass::from_status(StatusCode::NOT_FOUND), OutcomeClass::ClientError);
        assert_eq!(
            OutcomeClass::from_status(StatusCode::INSUFFICIENT_STORAGE),
            OutcomeClass::ServerError
        );
    }

    #[test]
    fn test_quorum_size() {
        assert_eq!(quorum_size(1), 1);
        assert_eq!(quorum_size(2), 2);
        assert_eq!(quorum_size(3), 2);
        assert_eq!(quorum_size(4), 3);
        assert_eq!(quorum_size(5), 3);
    }

    #[test]
    fn test_write_two_successes_and_a_timeout() {
        let decision = reduce_write(vec![
            outcome(1, 201),
            ReplicaOutcome::unreachable(2),
            outcome(3, 201),
        ]);
        assert_eq!(decision.status, StatusCode::CREATED);
        assert!(!decision.synthesized);
    }

    #[test]
    fn test_write_one_success_two_not_found() {
        let decision = reduce_write(vec![outcome(1, 204), outcome(2, 404), outcome(3, 404)]);
        assert_eq!(decision.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_write_success_iff_majority() {
        for n in 1..=6usize {
            for ok in 0..=n {
                let outcomes = (0..n)
                    .map(|i| {
                        if i < ok {
                            outcome(i as u64, 202)
                        } else {
                            ReplicaOutcome::unreachable(i as u64)
                        }
                    })
                    .collect();
                let decision = reduce_write(outcomes);
                assert_eq!(decision.is_success(), ok >= n / 2 + 1, "n={} ok={}", n, ok);
            }
        }
    }

    #[test]
    fn test_write_prefers_client_error_over_server_error() {
        let decision = reduce_write(vec![outcome(1, 500), outcome(2, 404), outcome(3, 503)]);
        assert_eq!(decision.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_write_highest_server_error() {
        let decision = reduce_write(vec![
            outcome(1, 500),
            outcome(2, 507),
            ReplicaOutcome::unreachable(3),
        ]);
        assert_eq!(decision.status, StatusCode::INSUFFICIENT_STORAGE);
    }

    #[test]
    fn test_write_all_unreachable() {
        let decision = reduce_write(vec![
            ReplicaOutcome::unreachable(1),
            ReplicaOutcome::unreachable(2),
        ]);
        assert_eq!(decision.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_write_most_common_success_status() {
        let decision = reduce_write(vec![outcome(1, 201), outcome(2, 202), outcome(3, 202)]);
        assert_eq!(decision.status, StatusCode::ACCEPTED);
    }

    #[test]
    fn test_read_first_success_wins() {
        let decision = reduce_read(vec![outcome(1, 200), outcome(2, 404), outcome(3, 500)]);
        assert_eq!(decision.status, StatusCode::OK);

        let decision = reduce_read(vec![outcome(1, 204), outcome(2, 200), outcome(3, 200)]);
        assert_eq!(decision.status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_read_not_found_beats_unreachable_and_server_error() {
        let decision = reduce_read(vec![
            ReplicaOutcome::unreachable(1),
            outcome(2, 500),
            outcome(3, 404),
        ]);
        assert_eq!(decision.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_read_server_error_beats_unreachable() {
        let decision = reduce_read(vec![ReplicaOutcome::unreachable(1), outcome(2, 507)]);
        assert_eq!(decision.status, StatusCode::INSUFFICIENT_STORAGE);
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_execute_future_is_send() {
        let transport = Arc::new(MockTransport::new());
        let coordinator = ReplicaCoordinator::new(transport, Duration::from_secs(1), 1);
        let nodes = nodes(3);
        for method in [Method::HEAD, Method::PUT] {
            let envelope = RequestEnvelope::new(method, 0, "/AUTH_a");
            assert_send(coordinator.execute(&envelope, &nodes));
        }
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_node_set() {
        let transport = Arc::new(MockTransport::new());
        let coordinator = ReplicaCoordinator::new(transport, Duration::from_secs(1), 1);
        let envelope = RequestEnvelope::new(Method::HEAD, 9, "/AUTH_a");
        let err = coordinator.execute(&envelope, &[]).await.unwrap_err();
        assert!(matches!(err, crate::Error::NoReplicas(9)));
    }

    #[tokio::test]
    async fn test_read_stops_at_first_success() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(1, Method::HEAD, 204);
        transport.respond(2, Method::HEAD, 404);
        transport.respond(3, Method::HEAD, 500);
        let coordinator = ReplicaCoordinator::new(transport.clone(), Duration::from_secs(1), 1);

        let envelope = RequestEnvelope::new(Method::HEAD, 0, "/AUTH_a");
        let decision = coordinator.execute(&envelope, &nodes(3)).await.unwrap();

        assert_eq!(decision.status, StatusCode::NO_CONTENT);
        assert_eq!(transport.calls_to(1), 1);
        assert_eq!(transport.calls_to(2), 0);
        assert_eq!(transport.calls_to(3), 0);
    }

    #[tokio::test]
    async fn test_read_continues_past_not_found() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(1, Method::GET, 404);
        transport.respond(2, Method::GET, 200);
        let coordinator = ReplicaCoordinator::new(transport.clone(), Duration::from_secs(1), 1);

        let envelope = RequestEnvelope::new(Method::GET, 0, "/AUTH_a");
        let decision = coordinator.execute(&envelope, &nodes(3)).await.unwrap();

        assert_eq!(decision.status, StatusCode::OK);
        assert_eq!(transport.calls_to(3), 0);
    }

    #[tokio::test]
    async fn test_concurrent_read_keeps_ring_order() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_after(1, Method::GET, 200, Duration::from_millis(50));
        transport.respond(2, Method::GET, 202);
        transport.respond(3, Method::GET, 202);
        let coordinator = ReplicaCoordinator::new(transport.clone(), Duration::from_secs(1), 3);

        let envelope = RequestEnvelope::new(Method::GET, 0, "/AUTH_a");
        let decision = coordinator.execute(&envelope, &nodes(3)).await.unwrap();

        assert_eq!(decision.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_write_timeout_counts_as_unreachable() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(1, Method::PUT, 201);
        transport.respond_after(2, Method::PUT, 201, Duration::from_secs(30));
        transport.respond(3, Method::PUT, 201);
        let coordinator = ReplicaCoordinator::new(transport.clone(), Duration::from_millis(50), 1);

        let envelope = RequestEnvelope::new(Method::PUT, 0, "/AUTH_a");
        let decision = coordinator.execute(&envelope, &nodes(3)).await.unwrap();

        assert_eq!(decision.status, StatusCode::CREATED);
        assert_eq!(transport.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_write_contacts_every_replica() {
        let transport = Arc::new(MockTransport::new());
        for id in 1..=5 {
            transport.respond(id, Method::DELETE, 204);
        }
        let coordinator = ReplicaCoordinator::new(transport.clone(), Duration::from_secs(1), 1);

        let envelope = RequestEnvelope::new(Method::DELETE, 0, "/AUTH_a");
        let decision = coordinator.execute(&envelope, &nodes(5)).await.unwrap();

        assert_eq!(decision.status, StatusCode::NO_CONTENT);
        for id in 1..=5 {
            assert_eq!(transport.calls_to(id), 1);
        }
    }
}

//! Proxy metrics
//!
//! Prometheus-compatible counters and latency histograms for:
//! - client requests per method and status class
//! - replica outcomes per class and quorum failures
//! - autocreate, cache invalidation and header filtering activity

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::proxy::replica::OutcomeClass;

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with default latency buckets
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    /// Create a histogram with custom bucket boundaries
    pub fn with_buckets(boundaries: &[f64]) -> Self {
        let buckets = (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in the histogram
    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // Stored as microseconds for precision
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative bucket counts, ending with the +Inf bucket
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Label for request methods the proxy does not serve
pub const OTHER_METHOD: &str = "OTHER";

/// Per-method request metrics
#[derive(Debug, Default)]
pub struct MethodMetrics {
    pub requests_total: Counter,
    pub requests_success: Counter,
    pub requests_client_error: Counter,
    pub requests_server_error: Counter,
    pub latency: Histogram,
}

/// Global metrics registry
#[derive(Debug)]
pub struct MetricsRegistry {
    methods: Mutex<HashMap<String, Arc<MethodMetrics>>>,

    pub replica_success: Counter,
    pub replica_client_error: Counter,
    pub replica_server_error: Counter,
    pub replica_unreachable: Counter,
    pub quorum_failures: Counter,

    pub autocreate_synthesized: Counter,
    pub autocreate_implicit: Counter,
    pub cache_invalidations: Counter,
    pub cache_failures: Counter,

    pub headers_removed_inbound: Counter,
    pub headers_removed_outbound: Counter,

    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            methods: Mutex::new(HashMap::new()),
            replica_success: Counter::new(),
            replica_client_error: Counter::new(),
            replica_server_error: Counter::new(),
            replica_unreachable: Counter::new(),
            quorum_failures: Counter::new(),
            autocreate_synthesized: Counter::new(),
            autocreate_implicit: Counter::new(),
            cache_invalidations: Counter::new(),
            cache_failures: Counter::new(),
            headers_removed_inbound: Counter::new(),
            headers_removed_outbound: Counter::new(),
            start_time: Instant::now(),
        }
    }

    /// Get or create metrics for a method. Methods outside the account API
    /// share the `OTHER` bucket so clients cannot add label values.
    pub fn method(&self, method: &str) -> Arc<MethodMetrics> {
        let label = match method {
            "GET" | "HEAD" | "PUT" | "POST" | "DELETE" => method,
            _ => OTHER_METHOD,
        };
        let mut methods = self
            .methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        methods
            .entry(label.to_string())
            .or_insert_with(|| Arc::new(MethodMetrics::default()))
            .clone()
    }

    /// Record a finished client request
    pub fn record_request(&self, method: &str, duration: Duration, status: u16) {
        let metrics = self.method(method);
        metrics.requests_total.inc();
        metrics.latency.observe(duration.as_secs_f64() * 1000.0);
        match status {
            200..=399 => metrics.requests_success.inc(),
            400..=499 => metrics.requests_client_error.inc(),
            _ => metrics.requests_server_error.inc(),
        }
    }

    /// Record one replica response
    pub fn record_outcome(&self, class: OutcomeClass) {
        match class {
            OutcomeClass::Success => self.replica_success.inc(),
            OutcomeClass::ClientError => self.replica_client_error.inc(),
            OutcomeClass::ServerError => self.replica_server_error.inc(),
            OutcomeClass::Unreachable => self.replica_unreachable.inc(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            let _ = writeln!(out, "# HELP ringproxy_{} {}", name, help);
            let _ = writeln!(out, "# TYPE ringproxy_{} counter", name);
            let _ = writeln!(out, "ringproxy_{} {}", name, value);
        };

        let _ = writeln!(out, "# HELP ringproxy_replica_responses_total Replica responses by class");
        let _ = writeln!(out, "# TYPE ringproxy_replica_responses_total counter");
        for (class, value) in [
            ("success", self.replica_success.get()),
            ("client_error", self.replica_client_error.get()),
            ("server_error", self.replica_server_error.get()),
            ("unreachable", self.replica_unreachable.get()),
        ] {
            let _ = writeln!(
                out,
                "ringproxy_replica_responses_total{{class=\"{}\"}} {}",
                class, value
            );
        }

        counter(
            &mut out,
            "quorum_failures_total",
            "Writes without a replica majority",
            self.quorum_failures.get(),
        );
        counter(
            &mut out,
            "autocreate_synthesized_total",
            "Reads answered with a placeholder account",
            self.autocreate_synthesized.get(),
        );
        counter(
            &mut out,
            "autocreate_implicit_total",
            "Implicit account creations",
            self.autocreate_implicit.get(),
        );
        counter(
            &mut out,
            "cache_invalidations_total",
            "Cache entries invalidated",
            self.cache_invalidations.get(),
        );
        counter(
            &mut out,
            "cache_failures_total",
            "Failed cache invalidations",
            self.cache_failures.get(),
        );
        counter(
            &mut out,
            "headers_removed_inbound_total",
            "System metadata headers stripped from requests",
            self.headers_removed_inbound.get(),
        );
        counter(
            &mut out,
            "headers_removed_outbound_total",
            "System metadata headers stripped from responses",
            self.headers_removed_outbound.get(),
        );

        let _ = writeln!(out, "# HELP ringproxy_uptime_seconds Server uptime in seconds");
        let _ = writeln!(out, "# TYPE ringproxy_uptime_seconds gauge");
        let _ = writeln!(out, "ringproxy_uptime_seconds {}", self.uptime_seconds());

        let methods = self
            .methods
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<&String> = methods.keys().collect();
        names.sort();

        let _ = writeln!(out, "# HELP ringproxy_requests_total Client requests by method and class");
        let _ = writeln!(out, "# TYPE ringproxy_requests_total counter");
        for name in &names {
            let m = &methods[*name];
            for (class, value) in [
                ("success", m.requests_success.get()),
                ("client_error", m.requests_client_error.get()),
                ("server_error", m.requests_server_error.get()),
            ] {
                let _ = writeln!(
                    out,
                    "ringproxy_requests_total{{method=\"{}\",class=\"{}\"}} {}",
                    name, class, value
                );
            }
        }

        let _ = writeln!(out, "# HELP ringproxy_request_duration_ms Request duration in milliseconds");
        let _ = writeln!(out, "# TYPE ringproxy_request_duration_ms histogram");
        for name in &names {
            let m = &methods[*name];
            for (le, count) in m.latency.get_buckets() {
                let le = if le.is_infinite() {
                    "+Inf".to_string()
                } else {
                    le.to_string()
                };
                let _ = writeln!(
                    out,
                    "ringproxy_request_duration_ms_bucket{{method=\"{}\",le=\"{}\"}} {}",
                    name, le, count
                );
            }
            let _ = writeln!(
                out,
                "ringproxy_request_duration_ms_sum{{method=\"{}\"}} {}",
                name,
                m.latency.sum()
            );
            let _ = writeln!(
                out,
                "ringproxy_request_duration_ms_count{{method=\"{}\"}} {}",
                name,
                m.latency.count()
            );
        }

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<MetricsRegistry> =
    once_cell::sync::Lazy::new(MetricsRegistry::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram() {
        let hist = Histogram::new();

        hist.observe(5.0);
        hist.observe(50.0);
        hist.observe(50_000.0);

        assert_eq!(hist.count(), 3);

        let buckets = hist.get_buckets();
        assert_eq!(buckets.last().unwrap().1, 3);
        assert_eq!(buckets[1], (5.0, 1));
    }

    #[test]
    fn test_counter() {
        let counter = Counter::new();

        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_record_request_by_class() {
        let registry = MetricsRegistry::new();

        registry.record_request("HEAD", Duration::from_millis(3), 204);
        registry.record_request("HEAD", Duration::from_millis(3), 404);
        registry.record_request("PUT", Duration::from_millis(9), 503);

        let head = registry.method("HEAD");
        assert_eq!(head.requests_total.get(), 2);
        assert_eq!(head.requests_success.get(), 1);
        assert_eq!(head.requests_client_error.get(), 1);
        assert_eq!(registry.method("PUT").requests_server_error.get(), 1);
    }

    #[test]
    fn test_extension_methods_share_one_bucket() {
        let registry = MetricsRegistry::new();

        registry.record_request("PURGE", Duration::from_millis(1), 405);
        registry.record_request("X-CUSTOM-1", Duration::from_millis(1), 405);
        registry.record_request("GET", Duration::from_millis(1), 200);

        assert_eq!(registry.method(OTHER_METHOD).requests_total.get(), 2);
        assert_eq!(registry.methods.lock().unwrap().len(), 2);
        let text = registry.to_prometheus();
        assert!(!text.contains("PURGE"));
        assert!(!text.contains("X-CUSTOM-1"));
    }

    #[test]
    fn test_prometheus_output() {
        let registry = MetricsRegistry::new();
        registry.record_outcome(OutcomeClass::Unreachable);
        registry.record_request("GET", Duration::from_millis(1), 200);

        let text = registry.to_prometheus();
        assert!(text.contains("ringproxy_replica_responses_total{class=\"unreachable\"} 1"));
        assert!(text.contains("ringproxy_requests_total{method=\"GET\",class=\"success\"} 1"));
        assert!(text.contains("ringproxy_request_duration_ms_count{method=\"GET\"} 1"));
    }
}

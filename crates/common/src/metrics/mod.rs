//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with latency-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all macrolens metrics
pub const METRICS_PREFIX: &str = "macrolens";

/// Histogram buckets for end-to-end rank latency (in seconds).
/// A rank request makes three text-generation calls before retrieval,
/// so the interesting range sits well above typical API latencies.
pub const RANK_LATENCY_BUCKETS: &[f64] = &[
    0.250, 0.500, 1.000, 2.000, 3.000, 5.000, 7.500, 10.00, 15.00, 30.00, 60.00,
];

/// Buckets for individual upstream calls
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_rank_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Rank requests by outcome (ranked, exhausted, failed)"
    );

    describe_histogram!(
        format!("{}_rank_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end rank pipeline latency in seconds"
    );

    describe_histogram!(
        format!("{}_rank_attempts", METRICS_PREFIX),
        Unit::Count,
        "Relaxation attempts used per rank request"
    );

    describe_gauge!(
        format!("{}_rank_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of accepted results in the last rank response"
    );

    describe_gauge!(
        format!("{}_candidate_pool_size", METRICS_PREFIX),
        Unit::Count,
        "Number of candidates retrieved for the last rank request"
    );

    describe_counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Calls to external collaborators by service and status"
    );

    describe_histogram!(
        format!("{}_upstream_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "External collaborator latency in seconds"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record one rank pipeline run
pub fn record_rank(duration_secs: f64, outcome: &str, attempts: u32, result_count: usize) {
    counter!(
        format!("{}_rank_requests_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_rank_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    histogram!(format!("{}_rank_attempts", METRICS_PREFIX)).record(attempts as f64);
    gauge!(format!("{}_rank_results_count", METRICS_PREFIX)).set(result_count as f64);
}

/// Helper to record the size of the retrieved candidate pool
pub fn record_pool_size(candidates: usize) {
    gauge!(format!("{}_candidate_pool_size", METRICS_PREFIX)).set(candidates as f64);
}

/// Helper to record a call to an external collaborator
pub fn record_upstream(service: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_upstream_duration_seconds", METRICS_PREFIX),
        "service" => service.to_string()
    )
    .record(duration_secs);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str, tier: &str) {
    let name = if hit { "cache_hits_total" } else { "cache_misses_total" };

    counter!(
        format!("{}_{}", METRICS_PREFIX, name),
        "cache" => cache_name.to_string(),
        "tier" => tier.to_string()
    )
    .increment(1);
}

//! Prometheus Metrics Definitions
//!
//! HTTP request metrics are recorded by the observability middleware. Engine
//! counters live in the sync engine and are mirrored into gauges whenever
//! `/metrics` is scraped.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use concord_agents::MetricsSnapshot;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<ConcordMetrics>> = Lazy::new(ConcordMetrics::new);

fn registration(name: &str) -> impl FnOnce(prometheus::Error) -> ApiError + '_ {
    move |e| ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Container for all Concord metrics.
#[derive(Clone)]
pub struct ConcordMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Engine event totals - labels: event
    pub engine_events: GaugeVec,

    /// Syncs received per agent - labels: agent
    pub agent_syncs: GaugeVec,

    /// Conflict resolutions per policy - labels: policy
    pub policy_hits: GaugeVec,

    pub active_operations: Gauge,
    pub active_locks: Gauge,
    pub conflicts_pending: Gauge,
    pub avg_resolution_ms: Gauge,
}

impl ConcordMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "concord_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(registration("http_requests_total"))?,

            http_request_duration_seconds: register_histogram_vec!(
                "concord_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(registration("http_request_duration_seconds"))?,

            engine_events: register_gauge_vec!(
                "concord_engine_events",
                "Sync engine event totals since start",
                &["event"]
            )
            .map_err(registration("engine_events"))?,

            agent_syncs: register_gauge_vec!(
                "concord_agent_syncs",
                "Sync requests received per agent",
                &["agent"]
            )
            .map_err(registration("agent_syncs"))?,

            policy_hits: register_gauge_vec!(
                "concord_policy_hits",
                "Conflicts resolved per policy",
                &["policy"]
            )
            .map_err(registration("policy_hits"))?,

            active_operations: register_gauge!(
                "concord_active_operations",
                "Sync operations currently in flight"
            )
            .map_err(registration("active_operations"))?,

            active_locks: register_gauge!("concord_active_locks", "Memory locks currently held")
                .map_err(registration("active_locks"))?,

            conflicts_pending: register_gauge!(
                "concord_conflicts_pending",
                "Conflicts awaiting resolution"
            )
            .map_err(registration("conflicts_pending"))?,

            avg_resolution_ms: register_gauge!(
                "concord_avg_resolution_ms",
                "Mean conflict resolution latency in milliseconds"
            )
            .map_err(registration("avg_resolution_ms"))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Copy an engine snapshot into the gauges.
    pub fn mirror_engine(&self, snapshot: &MetricsSnapshot) {
        let events = [
            ("total_syncs", snapshot.total_syncs),
            ("syncs_completed", snapshot.syncs_completed),
            ("syncs_failed", snapshot.syncs_failed),
            ("syncs_rejected", snapshot.syncs_rejected),
            ("conflicts_detected", snapshot.conflicts_detected),
            ("conflicts_resolved", snapshot.conflicts_resolved),
            ("manual_reviews", snapshot.manual_reviews),
            ("manual_resolutions", snapshot.manual_resolutions),
            ("merge_failures", snapshot.merge_failures),
            ("locks_acquired", snapshot.locks_acquired),
            ("locks_released", snapshot.locks_released),
            ("lock_failures", snapshot.lock_failures),
            ("lock_retries", snapshot.lock_retries),
            ("abandoned_operations", snapshot.abandoned_operations),
        ];
        for (event, value) in events {
            self.engine_events.with_label_values(&[event]).set(value as f64);
        }
        for (agent, count) in &snapshot.per_agent {
            self.agent_syncs.with_label_values(&[agent.as_str()]).set(*count as f64);
        }
        for (policy, count) in &snapshot.per_policy {
            self.policy_hits.with_label_values(&[policy.as_str()]).set(*count as f64);
        }

        self.active_operations.set(snapshot.active_operations as f64);
        self.active_locks.set(snapshot.active_locks as f64);
        self.conflicts_pending.set(snapshot.conflicts_pending as f64);
        self.avg_resolution_ms.set(snapshot.avg_resolution_ms);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match METRICS.as_ref() {
        Ok(metrics) => metrics.mirror_engine(&state.engine.metrics().await),
        Err(e) => tracing::warn!(error = %e, "Prometheus metrics unavailable"),
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;
    use std::collections::BTreeMap;

    fn metrics() -> Result<&'static ConcordMetrics, String> {
        METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))
    }

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        assert!(!metrics()?.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let metrics = metrics()?;
        metrics.record_http_request("POST", "/api/v1/sync", 200, 0.015);
        let count = metrics
            .http_requests_total
            .with_label_values(&["POST", "/api/v1/sync", "200"])
            .get();
        assert!(count >= 1.0);
        Ok(())
    }

    #[test]
    fn test_mirror_engine_sets_gauges() -> Result<(), String> {
        let metrics = metrics()?;
        let mut per_policy = BTreeMap::new();
        per_policy.insert("agent_priority".to_string(), 3);
        let snapshot = MetricsSnapshot {
            total_syncs: 10,
            syncs_completed: 8,
            syncs_failed: 1,
            syncs_rejected: 1,
            conflicts_detected: 3,
            conflicts_resolved: 3,
            conflicts_pending: 0,
            manual_reviews: 0,
            manual_resolutions: 0,
            merge_failures: 0,
            locks_acquired: 8,
            locks_released: 8,
            lock_failures: 0,
            lock_retries: 2,
            abandoned_operations: 0,
            avg_resolution_ms: 1.5,
            avg_sync_ms: 3.0,
            active_operations: 2,
            active_locks: 1,
            per_agent: BTreeMap::new(),
            per_policy,
        };

        metrics.mirror_engine(&snapshot);
        assert_eq!(metrics.engine_events.with_label_values(&["total_syncs"]).get(), 10.0);
        assert_eq!(metrics.policy_hits.with_label_values(&["agent_priority"]).get(), 3.0);
        assert_eq!(metrics.active_locks.get(), 1.0);
        Ok(())
    }
}

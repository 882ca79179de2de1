//! Concord Telemetry - Observability Infrastructure
//!
//! Structured JSON logging via `tracing` and Prometheus metrics for the API
//! layer. Engine counters are mirrored into gauges on every scrape.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, ConcordMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, TelemetryConfig};

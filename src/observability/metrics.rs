//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, route
//! - `proxy_request_duration_seconds` (histogram): latency by route
//! - `proxy_backend_activity_total` (counter): chunks and frames seen from backends
//! - `proxy_process_starts_total` (counter): processes spawned, by route
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels for route and status code only; never paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "route" => route.to_string()).record(start.elapsed().as_secs_f64());
}

pub fn record_backend_activity() {
    counter!("proxy_backend_activity_total").increment(1);
}

pub fn record_process_start(route: &str) {
    counter!("proxy_process_starts_total", "route" => route.to_string()).increment(1);
}

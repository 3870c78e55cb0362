//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, service, cache
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_upstream_errors_total` (counter): upstream failures by service, kind
//! - `proxy_backend_health` (gauge): 1=routable, 0=unhealthy, per endpoint
//! - `proxy_cache_events_total` (counter): hit, miss, expired, evicted, corrupt
//! - `proxy_cache_entries` (gauge): current cache size
//! - `proxy_pool_events_total` (counter): created, reused, discarded, exhausted
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, cache: &str, started: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string(),
        "cache" => cache.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "service" => service.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_upstream_error(service: &str, kind: &'static str) {
    counter!("proxy_upstream_errors_total", "service" => service.to_string(), "kind" => kind).increment(1);
}

pub fn record_backend_health(endpoint: &str, routable: bool) {
    gauge!("proxy_backend_health", "endpoint" => endpoint.to_string()).set(if routable { 1.0 } else { 0.0 });
}

pub fn record_cache_event(event: &'static str) {
    counter!("proxy_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(size: usize) {
    gauge!("proxy_cache_entries").set(size as f64);
}

pub fn record_pool_event(endpoint: &str, event: &'static str) {
    counter!("proxy_pool_events_total", "endpoint" => endpoint.to_string(), "event" => event).increment(1);
}

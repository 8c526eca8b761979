//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (request outcomes, latency, cache, breaker)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-endpoint and aggregate metrics
//!
//! # Metrics
//! - `breakwater_requests_total` (counter): executed calls by endpoint, status
//! - `breakwater_request_duration_seconds` (histogram): latency distribution
//! - `breakwater_cache_events_total` (counter): hit/miss/stale/evict
//! - `breakwater_cache_entries` (gauge): current cache size
//! - `breakwater_breaker_open_total` (counter): circuit-open transitions
//! - `breakwater_rate_limited_total` (counter): local budget rejections
//! - `breakwater_fallback_total` (counter): fallback hops by from/to
//! - `breakwater_endpoint_up` (gauge): 1=healthy probe, 0=failed probe
//! - `breakwater_probe_duration_seconds` (histogram): probe latency
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for endpoint, result status, cache event
//! - All recording helpers are no-ops until the exporter is installed

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed `execute` call.
pub fn record_request(endpoint: &str, status: &str, started: Instant) {
    counter!(
        "breakwater_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!(
        "breakwater_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn record_cache_event(event: &'static str) {
    counter!("breakwater_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_entries(entries: usize) {
    gauge!("breakwater_cache_entries").set(entries as f64);
}

pub fn record_breaker_open(endpoint: &str) {
    counter!("breakwater_breaker_open_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_rate_limited(endpoint: &str) {
    counter!("breakwater_rate_limited_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_fallback(from: &str, to: &str) {
    counter!(
        "breakwater_fallback_total",
        "from" => from.to_string(),
        "to" => to.to_string(),
    )
    .increment(1);
}

/// Probe outcome gauge, 1 up / 0 down.
pub fn record_endpoint_up(endpoint: &str, up: bool) {
    gauge!("breakwater_endpoint_up", "endpoint" => endpoint.to_string())
        .set(if up { 1.0 } else { 0.0 });
}

pub fn record_probe_duration(endpoint: &str, duration: Duration) {
    histogram!(
        "breakwater_probe_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(duration.as_secs_f64());
}

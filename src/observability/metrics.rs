//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hermes_requests_total` (counter): dispatches by model, status
//! - `hermes_request_duration_seconds` (histogram): dispatch latency by model
//! - `hermes_slots_in_flight` (gauge): live slots by model
//! - `hermes_slot_rejections_total` (counter): admission rejections by model
//! - `hermes_upstream_errors_total` (counter): upstream failures by kind
//! - `hermes_upstream_healthy` (gauge): 1=healthy, 0=unhealthy

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished (or rejected) dispatch.
pub fn record_dispatch(model: &str, status: u16, start: Option<Instant>) {
    counter!(
        "hermes_requests_total",
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if let Some(start) = start {
        histogram!("hermes_request_duration_seconds", "model" => model.to_string())
            .record(start.elapsed().as_secs_f64());
    }
}

pub fn set_slots_in_flight(model: &str, count: usize) {
    gauge!("hermes_slots_in_flight", "model" => model.to_string()).set(count as f64);
}

pub fn record_slot_rejection(model: &str) {
    counter!("hermes_slot_rejections_total", "model" => model.to_string()).increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("hermes_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_upstream_health(healthy: bool) {
    gauge!("hermes_upstream_healthy").set(if healthy { 1.0 } else { 0.0 });
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hub_admissions_total` (counter): admissions by outcome
//! - `hub_dispatch_total` (counter): confirmation enqueues by result
//! - `hub_confirmations_total` (counter): verification results
//! - `hub_requests_total` (counter): HTTP requests by method, status
//! - `hub_request_duration_seconds` (histogram): HTTP latency
//! - `hub_subscriptions` (gauge): stored subscriptions
//!
//! Without an installed recorder every call is a no-op, so library code and
//! tests can record freely.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_admission(outcome: &'static str) {
    counter!("hub_admissions_total", "outcome" => outcome).increment(1);
}

pub fn record_dispatch(result: &'static str) {
    counter!("hub_dispatch_total", "result" => result).increment(1);
}

pub fn record_confirmation(result: &'static str) {
    counter!("hub_confirmations_total", "result" => result).increment(1);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    counter!("hub_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    histogram!("hub_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_subscription_count(count: usize) {
    gauge!("hub_subscriptions").set(count as f64);
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `api_requests_total` (counter): requests by method, status
//! - `api_request_duration_seconds` (histogram): latency by method
//! - `api_rate_limited_total` (counter): requests denied by the rate limiter
//! - `api_gate_rejections_total` (counter): authorization rejections by reason
//! - `api_background_tasks_total` (counter): finished tasks by outcome
//! - `api_in_flight_requests` (gauge): requests currently being handled
//! - `api_rate_limiter_clients` (gauge): clients tracked after the last sweep
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;

    describe_counter!("api_requests_total", "Total HTTP requests processed");
    describe_histogram!("api_request_duration_seconds", "HTTP request duration in seconds");
    describe_counter!("api_rate_limited_total", "Requests denied by the rate limiter");
    describe_counter!("api_gate_rejections_total", "Requests rejected by an authorization gate");
    describe_counter!("api_background_tasks_total", "Background tasks finished, by outcome");
    describe_gauge!("api_in_flight_requests", "Requests currently being handled");
    describe_gauge!("api_rate_limiter_clients", "Clients tracked by the rate limiter");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "api_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("api_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("api_rate_limited_total").increment(1);
}

pub fn record_gate_rejection(reason: &'static str) {
    counter!("api_gate_rejections_total", "reason" => reason).increment(1);
}

pub fn record_background_task(outcome: &'static str) {
    counter!("api_background_tasks_total", "outcome" => outcome).increment(1);
}

pub fn set_in_flight(count: u64) {
    gauge!("api_in_flight_requests").set(count as f64);
}

pub fn record_rate_limiter_clients(count: usize) {
    gauge!("api_rate_limiter_clients").set(count as f64);
}

/// Middleware recording count and latency of every request.
pub async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    record_request(method.as_str(), response.status().as_u16(), start);
    response
}

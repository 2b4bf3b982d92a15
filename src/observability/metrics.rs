//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fsroute_requests_total` (counter): requests by method, status
//! - `fsroute_request_duration_seconds` (histogram): end-to-end latency by method
//! - `fsroute_module_loads_total` (counter): route module evaluations by outcome
//! - `fsroute_routes_registered` (gauge): (method, template) pairs currently mounted
//! - `fsroute_handler_errors_total` (counter): failed handler invocations by route
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is only installed when enabled in config
//! - Request metrics come from one pipeline layer, so 404s, middleware
//!   short-circuits and body-limit rejections are counted too

use std::net::SocketAddr;
use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Pipeline layer recording every request's status and latency.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let response = next.run(req).await;
    record_request(&method, response.status().as_u16(), start);
    response
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "fsroute_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("fsroute_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_module_load(outcome: &'static str) {
    counter!("fsroute_module_loads_total", "outcome" => outcome).increment(1);
}

pub fn record_routes_registered(count: usize) {
    gauge!("fsroute_routes_registered").set(count as f64);
}

pub fn record_handler_error(route: &str) {
    counter!("fsroute_handler_errors_total", "route" => route.to_string()).increment(1);
}

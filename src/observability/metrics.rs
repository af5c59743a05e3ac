//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): dispatched requests by outcome
//! - `dispatch_duration_seconds` (histogram): dispatch to completion
//! - `dispatch_rejected_total` (counter): scheduler rejections by scheduler
//! - `dispatch_queue_timeouts_total` (counter): admission timeouts by scheduler
//! - `routes_registered` (gauge): live routes in the registry
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing when metrics are disabled.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::scheduler::task::DispatchOutcome;

/// Install the Prometheus recorder and its HTTP endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_outcome(outcome: DispatchOutcome, elapsed: Duration) {
    metrics::counter!("dispatch_requests_total", "outcome" => outcome.as_str()).increment(1);
    metrics::histogram!("dispatch_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_rejected(scheduler: &str) {
    metrics::counter!("dispatch_rejected_total", "scheduler" => scheduler.to_string()).increment(1);
}

pub fn record_queue_timeout(scheduler: &str) {
    metrics::counter!("dispatch_queue_timeouts_total", "scheduler" => scheduler.to_string())
        .increment(1);
}

pub fn set_registered_routes(count: usize) {
    metrics::gauge!("routes_registered").set(count as f64);
}

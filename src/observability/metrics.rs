//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipehub_requests_total` (counter): requests by endpoint, outcome, status
//! - `pipehub_request_duration_seconds` (histogram): latency by endpoint
//! - `pipehub_pipes_active` (gauge): pipe instances currently open
//! - `pipehub_pipe_close_failures_total` (counter): failed closes by alias, reason
//!
//! Outcomes are `ok` (chain answered), `failed` (panic fallback answered)
//! and `not_found` (no route matched; endpoint label `none`).

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::pipe::{CloseFailure, CloseFailureReason};

/// Serve Prometheus metrics on `addr` and register metric descriptions.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_counter!("pipehub_requests_total", "Requests dispatched, by outcome");
    describe_histogram!(
        "pipehub_request_duration_seconds",
        "Time from dispatch to response, in seconds"
    );
    describe_gauge!("pipehub_pipes_active", "Pipe instances currently open");
    describe_counter!(
        "pipehub_pipe_close_failures_total",
        "Pipes that failed to close cleanly during shutdown"
    );

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Record one dispatched request.
pub fn record_request(endpoint: &str, outcome: &'static str, status: u16, start: Instant) {
    counter!(
        "pipehub_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "pipehub_request_duration_seconds",
        "endpoint" => endpoint.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_pipes_active(count: usize) {
    gauge!("pipehub_pipes_active").set(count as f64);
}

/// Record the outcome of closing every pipe. The active gauge drops to zero
/// either way; pipes that failed are not retried.
pub fn record_close_failures(failures: &[CloseFailure]) {
    gauge!("pipehub_pipes_active").set(0.0);
    for failure in failures {
        let reason = match failure.reason {
            CloseFailureReason::Failed(_) => "error",
            CloseFailureReason::Panicked => "panic",
            CloseFailureReason::DeadlineExceeded => "deadline",
        };
        counter!(
            "pipehub_pipe_close_failures_total",
            "alias" => failure.alias.clone(),
            "reason" => reason
        )
        .increment(1);
    }
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `agent_control_requests_total` (counter): control-plane requests by answering plugin kind and status
//! - `agent_inbound_request_duration_seconds` (histogram): wrapped handler latency
//! - `agent_spans_reported_total` (counter): spans accepted by a collector or the log
//! - `agent_spans_dropped_total` (counter): spans lost to a full queue or failed post
//! - `agent_report_batches_total` (counter): collector posts by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users pay nothing
//! - The Prometheus exporter is installed only by the binary

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub fn record_control_request(plugin: &str, status: u16) {
    counter!(
        "agent_control_requests_total",
        "plugin" => plugin.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_inbound_duration(elapsed: Duration) {
    histogram!("agent_inbound_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_span_reported(count: u64) {
    counter!("agent_spans_reported_total").increment(count);
}

pub fn record_span_dropped(count: u64) {
    counter!("agent_spans_dropped_total").increment(count);
}

pub fn record_report_batch(outcome: &'static str) {
    counter!("agent_report_batches_total", "outcome" => outcome).increment(1);
}

/// Install the Prometheus recorder and its scrape listener. Must run inside
/// a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

//! Metrics for the tracing core.
//!
//! # Metrics
//! - `tracing_segments_created_total` (counter): segments created, by kind
//! - `tracing_segments_finished_total` (counter): segments finished, by
//!   kind and error status
//! - `tracing_segment_duration_ms` (histogram): open-to-release latency
//! - `tracing_carrier_decode_failures_total` (counter): malformed carriers
//! - `tracing_release_faults_total` (counter): lifecycle misuse, by fault
//! - `tracing_export_dropped_total` (counter): segments dropped at export

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    if let Err(e) = builder.install() {
        tracing::error!(error = %e, "Failed to install Prometheus exporter");
    } else {
        tracing::info!(address = %addr, "Metrics endpoint listening");
    }
}

pub fn record_segment_created(kind: &'static str) {
    counter!("tracing_segments_created_total", "kind" => kind).increment(1);
}

pub fn record_segment_finished(kind: &'static str, error: bool, duration_ms: u64) {
    counter!(
        "tracing_segments_finished_total",
        "kind" => kind,
        "error" => if error { "true" } else { "false" }
    )
    .increment(1);
    histogram!("tracing_segment_duration_ms", "kind" => kind).record(duration_ms as f64);
}

pub fn record_carrier_decode_failure() {
    counter!("tracing_carrier_decode_failures_total").increment(1);
}

pub fn record_release_fault(fault: &'static str) {
    counter!("tracing_release_faults_total", "fault" => fault).increment(1);
}

pub fn record_export_dropped() {
    counter!("tracing_export_dropped_total").increment(1);
}

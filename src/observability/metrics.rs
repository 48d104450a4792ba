//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gql_connections_total` (counter): accepted connections by transport
//! - `gql_active_connections` (gauge): live connections
//! - `gql_operations_total` (counter): started operations by kind
//! - `gql_active_operations` (gauge): running streaming operations
//! - `gql_operation_outcomes_total` (counter): how streaming operations ended
//! - `gql_http_requests_total` (counter): single-shot HTTP replies by status
//! - `gql_http_request_duration_seconds` (histogram): HTTP exchange latency

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::net::TransportKind;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened(kind: TransportKind) {
    counter!("gql_connections_total", "transport" => kind.as_str()).increment(1);
    gauge!("gql_active_connections").increment(1.0);
}

pub fn record_connection_closed(_kind: TransportKind) {
    gauge!("gql_active_connections").decrement(1.0);
}

/// `kind` is `one_shot` or `stream`.
pub fn record_operation_started(kind: &'static str) {
    counter!("gql_operations_total", "kind" => kind).increment(1);
    if kind == "stream" {
        gauge!("gql_active_operations").increment(1.0);
    }
}

/// `outcome` is `completed`, `cancelled` or `failed`.
pub fn record_stream_finished(outcome: &'static str) {
    counter!("gql_operation_outcomes_total", "outcome" => outcome).increment(1);
    gauge!("gql_active_operations").decrement(1.0);
}

pub fn record_http_request(status: u16, start: Instant) {
    counter!("gql_http_requests_total", "status" => status.to_string()).increment(1);
    histogram!("gql_http_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_connections_total` (counter): accepted frontend connections
//! - `gateway_http_requests_total` (counter): proxied HTTP exchanges by status
//! - `gateway_websocket_upgrades_total` (counter): completed dual handshakes
//! - `gateway_proxy_errors_total` (counter): fatal connection errors by kind

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(err) => tracing::error!(error = %err, "Failed to start metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    counter!("gateway_connections_total").increment(1);
}

pub fn record_http_request(status: u16) {
    counter!("gateway_http_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_websocket_upgrade() {
    counter!("gateway_websocket_upgrades_total").increment(1);
}

pub fn record_proxy_error(kind: &'static str) {
    counter!("gateway_proxy_errors_total", "kind" => kind).increment(1);
}

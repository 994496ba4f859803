//! Metrics collection and Prometheus exporter for spacekit.
//!
//! The service records listener traffic, registrations and tunnels; the relay
//! records its reconnects and tunnels. Recording is a no-op until
//! [`init_prometheus`] installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize Prometheus metrics exporter.
///
/// Starts an HTTP server on the given address to expose metrics.
/// Returns an error message if binding fails.
pub fn init_prometheus(listen: &str) -> Result<(), String> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| format!("invalid metrics listen address: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install prometheus exporter: {}", e))?;

    // Export every error series at zero so rate() has a baseline.
    for error_type in spacekit_core::ERROR_TYPES {
        counter!(ERRORS_TOTAL, "type" => error_type).absolute(0);
    }
    Ok(())
}

// ============================================================================
// Metric Names
// ============================================================================

/// Inbound connections accepted, labelled by listener (`secure`/`insecure`).
pub const CONNECTIONS_TOTAL: &str = "spacekit_connections_total";
/// Inbound connections currently open.
pub const CONNECTIONS_ACTIVE: &str = "spacekit_connections_active";
/// Connections dropped because no hostname could be sniffed.
pub const SNIFF_FAILURES_TOTAL: &str = "spacekit_sniff_failures_total";
/// Relays currently registered.
pub const RELAYS_REGISTERED: &str = "spacekit_relays_registered";
/// Registrations that replaced an existing control channel.
pub const REGISTRATIONS_EVICTED_TOTAL: &str = "spacekit_registrations_evicted_total";
/// Failed relay credential checks.
pub const AUTH_FAILURES_TOTAL: &str = "spacekit_auth_failures_total";
/// Tunnels opened.
pub const TUNNELS_OPENED_TOTAL: &str = "spacekit_tunnels_opened_total";
/// Tunnels currently open.
pub const TUNNELS_ACTIVE: &str = "spacekit_tunnels_active";
/// Frames written to a control channel.
pub const FRAMES_SENT_TOTAL: &str = "spacekit_frames_sent_total";
/// Frames read from a control channel.
pub const FRAMES_RECEIVED_TOTAL: &str = "spacekit_frames_received_total";
/// Payload bytes carried in data frames, labelled by direction.
pub const TUNNEL_BYTES_TOTAL: &str = "spacekit_tunnel_bytes_total";
/// Relay reconnect attempts.
pub const RECONNECTS_TOTAL: &str = "spacekit_reconnects_total";
/// TLS handshake duration on the service's own endpoints (seconds).
pub const TLS_HANDSHAKE_DURATION_SECONDS: &str = "spacekit_tls_handshake_duration_seconds";
/// Errors by type.
pub const ERRORS_TOTAL: &str = "spacekit_errors_total";

// ============================================================================
// Metric Recording Functions
// ============================================================================

#[inline]
pub fn record_connection_accepted(listener: &'static str) {
    counter!(CONNECTIONS_TOTAL, "listener" => listener).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

#[inline]
pub fn record_connection_closed() {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a connection that could not be routed (`reason` is the sniff error).
#[inline]
pub fn record_sniff_failure(listener: &'static str, reason: &'static str) {
    counter!(SNIFF_FAILURES_TOTAL, "listener" => listener, "reason" => reason).increment(1);
}

#[inline]
pub fn set_relays_registered(count: usize) {
    gauge!(RELAYS_REGISTERED).set(count as f64);
}

#[inline]
pub fn record_registration_evicted() {
    counter!(REGISTRATIONS_EVICTED_TOTAL).increment(1);
}

#[inline]
pub fn record_auth_failure() {
    counter!(AUTH_FAILURES_TOTAL).increment(1);
}

#[inline]
pub fn record_tunnel_opened() {
    counter!(TUNNELS_OPENED_TOTAL).increment(1);
    gauge!(TUNNELS_ACTIVE).increment(1.0);
}

#[inline]
pub fn record_tunnel_closed() {
    gauge!(TUNNELS_ACTIVE).decrement(1.0);
}

/// Record a frame by kind (`open`/`data`/`close`) and direction (`sent`/`received`).
#[inline]
pub fn record_frame(direction: &'static str, kind: &'static str) {
    match direction {
        "sent" => counter!(FRAMES_SENT_TOTAL, "type" => kind).increment(1),
        _ => counter!(FRAMES_RECEIVED_TOTAL, "type" => kind).increment(1),
    }
}

/// Record tunneled payload bytes; `direction` is `inbound` (from the channel) or `outbound`.
#[inline]
pub fn record_tunnel_bytes(direction: &'static str, bytes: u64) {
    counter!(TUNNEL_BYTES_TOTAL, "direction" => direction).increment(bytes);
}

#[inline]
pub fn record_reconnect() {
    counter!(RECONNECTS_TOTAL).increment(1);
}

#[inline]
pub fn record_tls_handshake_duration(duration_secs: f64) {
    histogram!(TLS_HANDSHAKE_DURATION_SECONDS).record(duration_secs);
}

/// Record an error by type (one of the `spacekit_core::ERROR_*` labels).
#[inline]
pub fn record_error(error_type: &'static str) {
    counter!(ERRORS_TOTAL, "type" => error_type).increment(1);
}

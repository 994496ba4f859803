//! Hostname sniffers for inbound connections.
//!
//! Both parsers take the bytes buffered so far and report whether they are
//! enough to route the connection. They never consume anything: the caller
//! replays the whole buffer to whoever takes the socket.

mod http;
mod tls;

pub use http::{HttpHead, parse_http_head};
pub use tls::parse_client_hello;

/// Why a connection could not be routed by hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SniffError {
    #[error("header too long")]
    HeaderTooLong,
    #[error("no hostname provided")]
    NoHostname,
    #[error("not a TLS handshake")]
    NotTls,
    #[error("malformed ClientHello")]
    Malformed,
}

/// Strip a `:port` suffix (and IPv6 brackets) from a Host value and lowercase it.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let host = if let Some(rest) = raw.strip_prefix('[') {
        rest.split_once(']').map_or(rest, |(h, _)| h)
    } else if raw.matches(':').count() == 1 {
        raw.split_once(':').map_or(raw, |(h, _)| h)
    } else {
        raw
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

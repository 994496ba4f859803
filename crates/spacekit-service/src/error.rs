//! Service error types.

use spacekit_auth::AuthError;
use spacekit_core::{
    ERROR_AUTH, ERROR_CONFIG, ERROR_IO, ERROR_PROTOCOL, ERROR_RESOLVE, ERROR_TIMEOUT,
    ERROR_TLS_HANDSHAKE, ERROR_TRANSPORT,
};
use spacekit_dns::DnsError;
use spacekit_proto::SniffError;
use spacekit_transport::{MuxError, TransportError};
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("auth: {0}")]
    Auth(#[from] AuthError),
    #[error("config: {0}")]
    Config(String),
    #[error("{0}")]
    Sniff(#[from] SniffError),
    #[error("dns: {0}")]
    Dns(#[from] DnsError),
    #[error("tunnel: {0}")]
    Mux(#[from] MuxError),
    #[error("rejected: {0}")]
    Rejected(&'static str),
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl ServiceError {
    /// Get the error type string for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::Io(_) => ERROR_IO,
            ServiceError::Tls(_) => ERROR_TLS_HANDSHAKE,
            ServiceError::Transport(e) => e.error_type(),
            ServiceError::WebSocket(_) => ERROR_TRANSPORT,
            ServiceError::Auth(_) => ERROR_AUTH,
            ServiceError::Config(_) => ERROR_CONFIG,
            ServiceError::Sniff(_) => ERROR_PROTOCOL,
            ServiceError::Dns(_) => ERROR_RESOLVE,
            ServiceError::Mux(e) => e.error_type(),
            ServiceError::Rejected(_) => ERROR_PROTOCOL,
            ServiceError::Timeout(_) => ERROR_TIMEOUT,
        }
    }
}

//! Relay error types.

use spacekit_cert::CertificateError;
use spacekit_core::{ERROR_CONFIG, ERROR_IO, ERROR_TIMEOUT, ERROR_TRANSPORT};
use spacekit_transport::TransportError;
use tokio_tungstenite::tungstenite;

use crate::port_map::PortMapError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    PortMap(#[from] PortMapError),

    #[error("certificate: {0}")]
    Certificate(#[from] CertificateError),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl RelayError {
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Io(_) => ERROR_IO,
            RelayError::Transport(e) => e.error_type(),
            RelayError::WebSocket(_) => ERROR_TRANSPORT,
            RelayError::Config(_) | RelayError::PortMap(_) => ERROR_CONFIG,
            RelayError::Certificate(e) => e.error_type(),
            RelayError::Timeout(_) => ERROR_TIMEOUT,
        }
    }
}

//! Error types for the transport crate.

use spacekit_core::{
    ERROR_CERTIFICATE, ERROR_CONFIG, ERROR_IO, ERROR_NO_MAPPING, ERROR_PROTOCOL,
    ERROR_TLS_HANDSHAKE, ERROR_TRANSPORT,
};
use spacekit_proto::DecodeError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Control-channel and TLS setup failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("protocol violation: {0}")]
    Protocol(#[from] DecodeError),

    #[error("config error: {0}")]
    Config(String),
}

impl TransportError {
    pub fn error_type(&self) -> &'static str {
        match self {
            TransportError::Io(_) => ERROR_IO,
            TransportError::Tls(_) => ERROR_TLS_HANDSHAKE,
            TransportError::WebSocket(_) => ERROR_TRANSPORT,
            TransportError::Protocol(_) => ERROR_PROTOCOL,
            TransportError::Config(_) => ERROR_CONFIG,
        }
    }
}

/// Failures of a single tunnel. These close the tunnel, never the channel.
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("no mapping for port {0}")]
    NoMapping(u16),

    #[error("this side does not accept open requests")]
    OpenRejected,

    #[error("certificate unavailable: {0}")]
    Certificate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("control channel closed")]
    ChannelClosed,
}

impl MuxError {
    pub fn error_type(&self) -> &'static str {
        match self {
            MuxError::NoMapping(_) => ERROR_NO_MAPPING,
            MuxError::OpenRejected => ERROR_PROTOCOL,
            MuxError::Certificate(_) => ERROR_CERTIFICATE,
            MuxError::Io(_) => ERROR_IO,
            MuxError::ChannelClosed => ERROR_TRANSPORT,
        }
    }
}

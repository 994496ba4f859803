//! Tunnel plumbing shared by the spacekit service and relay.
//!
//! - [`TunnelStream`]: the capability every tunneled socket exposes, whether
//!   it is a raw TCP socket, a TLS-terminated stream or a replayed prefix.
//! - [`mux`]: the socket multiplexer keyed by connection id.
//! - [`channel`]: pumps frames between a WebSocket and a multiplexer.
//! - [`tls`]: rustls configuration helpers.

pub mod channel;
pub mod error;
pub mod mux;
pub mod tls;

use tokio::io::{AsyncRead, AsyncWrite};

pub use channel::{ChannelConfig, ChannelEnd, ChannelHandle, ControlChannel, ws_config};
pub use error::{MuxError, TransportError};
pub use mux::{
    Multiplexer, MultiplexerHandle, OpenRequest, RejectOpen, TunnelOpener, TunnelState,
};
pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// A byte stream that can be tunneled.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> TunnelStream for T {}

/// Type-erased tunnel endpoint.
pub type BoxedStream = Box<dyn TunnelStream>;

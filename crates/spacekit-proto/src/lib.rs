//! Wire formats spoken by spacekit.
//!
//! - [`frame`]: the header/body framing carried over the control channel.
//!   Every logical frame is two transport messages: a JSON header, then a raw
//!   body. [`FrameDecoder`] reassembles them.
//! - [`sniff`]: incremental parsers that pull the target hostname out of the
//!   first bytes of an inbound connection (TLS SNI or HTTP `Host`).
//!
//! Parsers here never touch I/O; callers feed them whatever they buffered so far.

pub mod frame;
pub mod sniff;

pub use frame::{ConnectionId, DecodeError, DecoderState, Frame, FrameDecoder, FrameHeader, MessageType};
pub use sniff::{HttpHead, SniffError, parse_client_hello, parse_http_head};

/// WebSocket subprotocol negotiated on the control channel.
pub const SUBPROTOCOL: &str = "spacekit";
/// Upgrade header carrying the relay's subdomain.
pub const HEADER_SUBDOMAIN: &str = "x-spacekit-subdomain";
/// Upgrade header carrying the relay owner's username.
pub const HEADER_USERNAME: &str = "x-spacekit-username";
/// Upgrade header carrying the relay owner's API key.
pub const HEADER_APIKEY: &str = "x-spacekit-apikey";
/// Path prefix of ACME HTTP-01 challenge requests.
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Result of an incremental parse.
///
/// - `Complete(value)` - enough bytes were buffered
/// - `Incomplete(n)` - buffer too small; `n` is the **minimum total bytes** needed
/// - `Invalid(err)` - the bytes can never parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    Complete(T),
    Incomplete(usize),
    Invalid(SniffError),
}

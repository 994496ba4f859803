//! Control-channel framing.
//!
//! A frame travels as exactly two consecutive transport messages:
//!
//! 1. a header: UTF-8 JSON `{"connectionId": "...", "type": "open"|"data"|"close", ...}`
//! 2. a body: raw bytes, possibly empty, never interpreted
//!
//! Receivers alternate strictly between the two. The header/body pairing
//! relies on the transport preserving message order and boundaries.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one tunneled connection, unique per control channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Fresh random (UUID v4) id.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Open,
    Data,
    Close,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageType::Open => "open",
            MessageType::Data => "data",
            MessageType::Close => "close",
        })
    }
}

/// JSON header of a frame.
///
/// `port` is present on `open`. `hostname` is the routed hostname, sent by the
/// service on `open` for logging on the relay side. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameHeader {
    pub connection_id: ConnectionId,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl FrameHeader {
    pub fn to_json(&self) -> String {
        // A header holds only strings and integers; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A complete frame: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl Frame {
    pub fn open(connection_id: ConnectionId, port: u16, hostname: Option<String>) -> Self {
        Self {
            header: FrameHeader {
                connection_id,
                kind: MessageType::Open,
                port: Some(port),
                hostname,
            },
            body: Bytes::new(),
        }
    }

    pub fn data(connection_id: ConnectionId, body: Bytes) -> Self {
        Self {
            header: FrameHeader {
                connection_id,
                kind: MessageType::Data,
                port: None,
                hostname: None,
            },
            body,
        }
    }

    pub fn close(connection_id: ConnectionId) -> Self {
        Self {
            header: FrameHeader {
                connection_id,
                kind: MessageType::Close,
                port: None,
                hostname: None,
            },
            body: Bytes::new(),
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.header.connection_id
    }

    pub fn kind(&self) -> MessageType {
        self.header.kind
    }

    /// The two transport messages for this frame: JSON header, then body.
    pub fn into_messages(self) -> (String, Bytes) {
        (self.header.to_json(), self.body)
    }
}

/// Frame decoding failure. Fatal for the control channel.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid frame header: {0}")]
    InvalidHeader(#[from] serde_json::Error),
    #[error("open frame without port")]
    MissingPort,
}

/// Which message the decoder expects next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DecoderState {
    #[default]
    AwaitingHeader,
    AwaitingBody(FrameHeader),
}

/// Reassembles frames from the alternating header/body message sequence.
///
/// The message kind (text or binary) does not matter, only its position.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    state: DecoderState,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    /// Feed one transport message.
    ///
    /// Returns `Ok(None)` after a header, `Ok(Some(frame))` after its body.
    /// A header that fails to parse leaves the decoder awaiting a header, but
    /// callers treat any error as fatal for the channel.
    pub fn feed(&mut self, message: Bytes) -> Result<Option<Frame>, DecodeError> {
        match std::mem::take(&mut self.state) {
            DecoderState::AwaitingHeader => {
                let header: FrameHeader = serde_json::from_slice(&message)?;
                if header.kind == MessageType::Open && header.port.is_none() {
                    return Err(DecodeError::MissingPort);
                }
                self.state = DecoderState::AwaitingBody(header);
                Ok(None)
            }
            DecoderState::AwaitingBody(header) => Ok(Some(Frame {
                header,
                body: message,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut FrameDecoder, frames: &[Frame]) -> Vec<Frame> {
        let mut out = Vec::new();
        for frame in frames {
            let (header, body) = frame.clone().into_messages();
            assert!(decoder.feed(Bytes::from(header)).unwrap().is_none());
            out.push(decoder.feed(body).unwrap().unwrap());
        }
        out
    }

    #[test]
    fn header_json_uses_wire_field_names() {
        let frame = Frame::open(ConnectionId::from("abc"), 443, Some("web.alice.spacekit.io".into()));
        let (json, body) = frame.into_messages();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["connectionId"], "abc");
        assert_eq!(value["type"], "open");
        assert_eq!(value["port"], 443);
        assert_eq!(value["hostname"], "web.alice.spacekit.io");
        assert!(body.is_empty());

        let (json, _) = Frame::close(ConnectionId::from("abc")).into_messages();
        assert_eq!(json, r#"{"connectionId":"abc","type":"close"}"#);
    }

    #[test]
    fn alternation_yields_frames_in_order() {
        let id = ConnectionId::random();
        let frames = vec![
            Frame::open(id.clone(), 443, None),
            Frame::data(id.clone(), Bytes::from_static(b"\x16\x03\x01hello")),
            Frame::data(id.clone(), Bytes::new()),
            Frame::close(id),
        ];
        let mut decoder = FrameDecoder::new();
        assert_eq!(feed_all(&mut decoder, &frames), frames);
        assert_eq!(decoder.state(), &DecoderState::AwaitingHeader);
    }

    #[test]
    fn zero_length_body_completes_frame() {
        let mut decoder = FrameDecoder::new();
        decoder
            .feed(Bytes::from_static(br#"{"connectionId":"x","type":"data"}"#))
            .unwrap();
        assert!(matches!(decoder.state(), DecoderState::AwaitingBody(_)));
        let frame = decoder.feed(Bytes::new()).unwrap().unwrap();
        assert_eq!(frame.kind(), MessageType::Data);
        assert!(frame.body.is_empty());
    }

    #[test]
    fn body_is_never_parsed() {
        let mut decoder = FrameDecoder::new();
        decoder
            .feed(Bytes::from_static(br#"{"connectionId":"x","type":"data"}"#))
            .unwrap();
        // Looks like a header, but sits in body position.
        let body = Bytes::from_static(br#"{"connectionId":"y","type":"close"}"#);
        let frame = decoder.feed(body.clone()).unwrap().unwrap();
        assert_eq!(frame.connection_id().as_str(), "x");
        assert_eq!(frame.body, body);
    }

    #[test]
    fn body_bytes_in_header_position_are_rejected() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed(Bytes::from_static(b"\x16\x03\x01\x02\x00")).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidHeader(_)));

        let err = decoder
            .feed(Bytes::from_static(br#"{"connectionId":"x","type":"resize"}"#))
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidHeader(_)));
    }

    #[test]
    fn open_requires_port() {
        let mut decoder = FrameDecoder::new();
        let err = decoder
            .feed(Bytes::from_static(br#"{"connectionId":"x","type":"open"}"#))
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingPort));
    }

    #[test]
    fn unknown_header_fields_are_ignored() {
        let mut decoder = FrameDecoder::new();
        decoder
            .feed(Bytes::from_static(
                br#"{"connectionId":"x","type":"open","port":80,"trace":"abc"}"#,
            ))
            .unwrap();
        let frame = decoder.feed(Bytes::new()).unwrap().unwrap();
        assert_eq!(frame.header.port, Some(80));
        assert_eq!(frame.header.hostname, None);
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(ConnectionId::random(), ConnectionId::random());
    }
}

//! Control-channel upgrade on the API hostname.

use spacekit_proto::{
    HEADER_APIKEY, HEADER_SUBDOMAIN, HEADER_USERNAME, ParseResult, SUBPROTOCOL, SniffError,
};
use spacekit_transport::ws_config;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue, SEC_WEBSOCKET_PROTOCOL,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async_with_config};
use tracing::debug;

use crate::error::ServiceError;

const HTTP_HEADER_END: &[u8] = b"\r\n\r\n";

/// What a request on a local hostname asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// WebSocket upgrade offering the control-channel subprotocol.
    ControlUpgrade,
    /// Anything else, including non-HTTP bytes.
    Plain,
}

/// Classify a buffered request head.
pub fn inspect_request(buf: &[u8], max_header_bytes: usize) -> ParseResult<RequestKind> {
    let Some(end) = find_header_end(buf) else {
        return if buf.len() > max_header_bytes {
            ParseResult::Invalid(SniffError::HeaderTooLong)
        } else {
            ParseResult::Incomplete(buf.len() + 1)
        };
    };
    let Ok(head) = std::str::from_utf8(&buf[..end]) else {
        return ParseResult::Complete(RequestKind::Plain);
    };
    let mut lines = head.split("\r\n");
    let mut parts = lines.next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let _path = parts.next();
    let version = parts.next().unwrap_or("");
    if method != "GET" || !version.starts_with("HTTP/") {
        return ParseResult::Complete(RequestKind::Plain);
    }

    let mut upgrade = false;
    let mut connection_upgrade = false;
    let mut ws_key = false;
    let mut subprotocol = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "upgrade" => upgrade |= value.eq_ignore_ascii_case("websocket"),
            "connection" => {
                connection_upgrade |= value
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
            }
            "sec-websocket-key" => ws_key |= !value.is_empty(),
            "sec-websocket-protocol" => {
                subprotocol |= value.split(',').any(|p| p.trim() == SUBPROTOCOL)
            }
            _ => {}
        }
    }

    if upgrade && connection_upgrade && ws_key && subprotocol {
        ParseResult::Complete(RequestKind::ControlUpgrade)
    } else {
        ParseResult::Complete(RequestKind::Plain)
    }
}

/// Relay identity from the upgrade headers.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub subdomain: String,
    pub username: String,
    pub apikey: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("subdomain", &self.subdomain)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn is_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

fn credentials(req: &Request) -> Result<Credentials, &'static str> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let (Some(subdomain), Some(username), Some(apikey)) = (
        header(HEADER_SUBDOMAIN),
        header(HEADER_USERNAME),
        header(HEADER_APIKEY),
    ) else {
        return Err("missing relay credentials");
    };
    if !is_label(subdomain) || !is_label(username) {
        return Err("invalid subdomain or username");
    }
    Ok(Credentials {
        subdomain: subdomain.to_ascii_lowercase(),
        username: username.to_ascii_lowercase(),
        apikey: apikey.to_owned(),
    })
}

fn bad_request(reason: &'static str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_owned()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

/// Complete the WebSocket handshake, requiring the relay credential headers.
///
/// Missing or malformed credentials answer `400 Bad Request`.
pub async fn accept_control<S>(
    stream: S,
    max_frame_bytes: usize,
) -> Result<(WebSocketStream<S>, Credentials), ServiceError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut found = None;
    let ws = accept_hdr_async_with_config(
        stream,
        |req: &Request, mut response: Response| {
            let creds = match credentials(req) {
                Ok(creds) => creds,
                Err(reason) => {
                    debug!(reason, "control upgrade rejected");
                    return Err(bad_request(reason));
                }
            };
            found = Some(creds);
            let headers = response.headers_mut();
            headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            Ok(response)
        },
        Some(ws_config(max_frame_bytes)),
    )
    .await?;
    let creds = found.ok_or(ServiceError::Rejected("missing relay credentials"))?;
    Ok((ws, creds))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HTTP_HEADER_END.len())
        .position(|w| w == HTTP_HEADER_END)
        .map(|idx| idx + HTTP_HEADER_END.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    const UPGRADE: &str = "GET / HTTP/1.1\r\nHost: api.spacekit.test\r\nUpgrade: websocket\r\n\
        Connection: keep-alive, Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\nSec-WebSocket-Protocol: spacekit\r\n\r\n";

    #[test]
    fn detects_control_upgrade() {
        assert_eq!(
            inspect_request(UPGRADE.as_bytes(), 8192),
            ParseResult::Complete(RequestKind::ControlUpgrade)
        );
    }

    #[test]
    fn upgrade_without_subprotocol_is_plain() {
        let req = UPGRADE.replace("Sec-WebSocket-Protocol: spacekit\r\n", "");
        assert_eq!(
            inspect_request(req.as_bytes(), 8192),
            ParseResult::Complete(RequestKind::Plain)
        );
    }

    #[test]
    fn ordinary_request_is_plain() {
        assert_eq!(
            inspect_request(b"POST /signup HTTP/1.1\r\nHost: api\r\n\r\n", 8192),
            ParseResult::Complete(RequestKind::Plain)
        );
    }

    #[test]
    fn partial_and_oversized_heads() {
        assert_eq!(inspect_request(b"GET / HTTP/1.1\r\n", 8192), ParseResult::Incomplete(17));
        assert_eq!(
            inspect_request(&[b'x'; 40], 32),
            ParseResult::Invalid(SniffError::HeaderTooLong)
        );
    }

    fn request(headers: &[(&'static str, &str)]) -> Request {
        let mut req = "ws://api.spacekit.test/".into_client_request().unwrap();
        for (name, value) in headers {
            req.headers_mut().insert(*name, value.parse().unwrap());
        }
        req
    }

    #[test]
    fn credentials_are_required_and_normalized() {
        let req = request(&[
            (HEADER_SUBDOMAIN, "Web"),
            (HEADER_USERNAME, "Alice"),
            (HEADER_APIKEY, "secret"),
        ]);
        let creds = credentials(&req).unwrap();
        assert_eq!(creds.subdomain, "web");
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.apikey, "secret");
        assert!(!format!("{creds:?}").contains("secret"));

        let req = request(&[(HEADER_SUBDOMAIN, "web"), (HEADER_USERNAME, "alice")]);
        assert_eq!(credentials(&req), Err("missing relay credentials"));

        let req = request(&[
            (HEADER_SUBDOMAIN, "a.b"),
            (HEADER_USERNAME, "alice"),
            (HEADER_APIKEY, "k"),
        ]);
        assert_eq!(credentials(&req), Err("invalid subdomain or username"));
    }
}

//! Per-connection handlers for both listeners.

mod control;
mod fallback;
mod local;

pub use local::serve_local;

use std::net::SocketAddr;
use std::sync::Arc;

use spacekit_core::io::PrefixedStream;
use spacekit_metrics::record_sniff_failure;
use spacekit_proto::{ParseResult, parse_client_hello, parse_http_head};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::ServiceError;
use crate::router::{InsecureRoute, SecureRoute};
use crate::sniff::{failure_reason, sniff};
use crate::state::{LocalSite, ServiceState};

pub const LISTENER_SECURE: &str = "secure";
pub const LISTENER_INSECURE: &str = "insecure";

const SECURE_PORT: u16 = 443;
const INSECURE_PORT: u16 = 80;

/// A connection on the TLS port, routed by SNI.
pub async fn handle_secure<S>(
    mut stream: S,
    state: Arc<ServiceState>,
    peer: SocketAddr,
) -> Result<(), ServiceError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let max = state.max_header_bytes;
    let sniffed = sniff(&mut stream, state.sniff_timeout, |buf| parse_client_hello(buf, max)).await;
    let (hostname, hello) = match sniffed {
        Ok(v) => v,
        Err(err) => {
            record_sniff_failure(LISTENER_SECURE, failure_reason(&err));
            debug!(peer = %peer, error = %err, "SNI sniff failed");
            return Ok(());
        }
    };
    let stream = PrefixedStream::new(hello, stream);

    match state.router.route_secure(&hostname) {
        SecureRoute::Api => serve_local(stream, LocalSite::Api, state, peer).await,
        SecureRoute::Web => serve_local(stream, LocalSite::Web, state, peer).await,
        SecureRoute::Relay(channel) => {
            let id = channel.add_socket(Box::new(stream), &hostname, SECURE_PORT)?;
            debug!(peer = %peer, hostname = %hostname, connection = %id, "tunneled");
            Ok(())
        }
        SecureRoute::Unknown => {
            debug!(peer = %peer, hostname = %hostname, "no relay for hostname");
            Ok(())
        }
    }
}

/// A connection on the plaintext port, routed by Host and path.
pub async fn handle_insecure<S>(
    mut stream: S,
    state: Arc<ServiceState>,
    peer: SocketAddr,
) -> Result<(), ServiceError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let max = state.max_header_bytes;
    let sniffed = sniff(&mut stream, state.sniff_timeout, |buf| match parse_http_head(buf, max) {
        ParseResult::Complete(head) => ParseResult::Complete((head.hostname(), head.path.to_owned())),
        ParseResult::Incomplete(n) => ParseResult::Incomplete(n),
        ParseResult::Invalid(e) => ParseResult::Invalid(e),
    })
    .await;
    let ((hostname, path), head) = match sniffed {
        Ok(v) => v,
        Err(err) => {
            record_sniff_failure(LISTENER_INSECURE, failure_reason(&err));
            debug!(peer = %peer, error = %err, "Host sniff failed");
            if let ServiceError::Sniff(e) = err {
                let response = format!("HTTP/1.1 500 {e}\r\n\r\n");
                stream.write_all(response.as_bytes()).await?;
                stream.shutdown().await?;
            }
            return Ok(());
        }
    };

    let response = match state.router.route_insecure(&hostname, &path) {
        InsecureRoute::Relay(channel) => {
            let stream = PrefixedStream::new(head, stream);
            let id = channel.add_socket(Box::new(stream), &hostname, INSECURE_PORT)?;
            debug!(peer = %peer, hostname = %hostname, connection = %id, "tunneled ACME request");
            return Ok(());
        }
        route => route.response(),
    };
    if let Some(response) = response {
        debug!(peer = %peer, hostname = %hostname, path = %path, "plaintext request answered locally");
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;
    }
    Ok(())
}

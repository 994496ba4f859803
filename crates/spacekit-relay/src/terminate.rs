//! TLS termination adapter.
//!
//! The tunnel carries the public client's TLS bytes. The adapter completes
//! the handshake with the relay's own certificate and splices the cleartext
//! to a plain local socket, so local services never deal with TLS.

use std::sync::Arc;
use std::time::Duration;

use spacekit_core::ERROR_TLS_HANDSHAKE;
use spacekit_core::io::{NoOpMetrics, pipe_bidirectional};
use spacekit_metrics::record_error;
use spacekit_transport::BoxedStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

/// Return the tunnel-facing end of a TLS terminator wired to `upstream`.
pub fn terminate<S>(
    config: Arc<rustls::ServerConfig>,
    upstream: S,
    handshake_timeout: Duration,
    buffer_size: usize,
) -> BoxedStream
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tunnel_side, tls_side) = tokio::io::duplex(buffer_size);
    tokio::spawn(async move {
        let accept = TlsAcceptor::from(config).accept(tls_side);
        let tls = match tokio::time::timeout(handshake_timeout, accept).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                record_error(ERROR_TLS_HANDSHAKE);
                debug!(error = %e, "tls termination handshake failed");
                return;
            }
            Err(_) => {
                record_error(ERROR_TLS_HANDSHAKE);
                debug!("tls termination handshake timed out");
                return;
            }
        };
        if let Err(e) = pipe_bidirectional(tls, upstream, None, buffer_size, &NoOpMetrics).await {
            debug!(error = %e, "terminated stream closed with error");
        }
    });
    Box::new(tunnel_side)
}

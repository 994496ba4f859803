//! Non-control traffic on the own hostnames.

use std::net::SocketAddr;
use std::time::Duration;

use spacekit_core::io::{NoOpMetrics, pipe_bidirectional};
use spacekit_core::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_PIPE_BUFFER_SIZE};
use spacekit_dns::DnsResolver;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::ServiceError;
use crate::state::LocalSite;

const NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Forward `stream` (request bytes already replayed in front) to `backend`,
/// or answer `404 Not Found` when no backend is configured.
///
/// `backend` is `host:port`; hostnames go through `resolver`.
pub async fn handle_fallback<S>(
    mut stream: S,
    site: LocalSite,
    backend: Option<&str>,
    resolver: &DnsResolver,
    peer: SocketAddr,
) -> Result<(), ServiceError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(backend) = backend else {
        debug!(peer = %peer, site = site.as_str(), "no fallback backend, 404");
        stream.write_all(NOT_FOUND).await?;
        stream.shutdown().await?;
        return Ok(());
    };

    debug!(peer = %peer, site = site.as_str(), backend, "connecting to fallback");
    let connect = async {
        let addr = resolver.resolve(backend).await?;
        Ok::<_, ServiceError>(TcpStream::connect(addr).await?)
    };
    let upstream = tokio::time::timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS), connect)
        .await
        .map_err(|_| ServiceError::Timeout("fallback connect"))??;
    let _ = upstream.set_nodelay(true);

    pipe_bidirectional(stream, upstream, None, DEFAULT_PIPE_BUFFER_SIZE, &NoOpMetrics).await?;
    debug!(peer = %peer, backend, "fallback finished");
    Ok(())
}

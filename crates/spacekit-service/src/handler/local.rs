//! HTTPS on the service's own hostnames.

use std::net::SocketAddr;
use std::sync::Arc;

use spacekit_core::ERROR_TLS_HANDSHAKE;
use spacekit_core::io::PrefixedStream;
use spacekit_metrics::{record_error, record_tls_handshake_duration};
use spacekit_transport::TunnelStream;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use super::control::handle_control;
use super::fallback::handle_fallback;
use crate::error::ServiceError;
use crate::sniff::sniff;
use crate::state::{LocalSite, ServiceState};
use crate::ws::{RequestKind, inspect_request};

/// Terminate TLS, then either register a relay or hand off to the fallback.
pub async fn serve_local<S>(
    stream: S,
    site: LocalSite,
    state: Arc<ServiceState>,
    peer: SocketAddr,
) -> Result<(), ServiceError>
where
    S: TunnelStream,
{
    let acceptor = TlsAcceptor::from(state.tls_for(site));
    let start = Instant::now();
    let mut tls = match tokio::time::timeout(state.tls_handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => {
            record_tls_handshake_duration(start.elapsed().as_secs_f64());
            tls
        }
        Ok(Err(err)) => {
            record_error(ERROR_TLS_HANDSHAKE);
            debug!(peer = %peer, site = site.as_str(), error = %err, "TLS handshake failed");
            return Ok(());
        }
        Err(_) => {
            record_error(ERROR_TLS_HANDSHAKE);
            debug!(peer = %peer, site = site.as_str(), "TLS handshake timed out");
            return Ok(());
        }
    };

    let max = state.max_header_bytes;
    let (kind, head) = sniff(&mut tls, state.sniff_timeout, |buf| inspect_request(buf, max)).await?;
    let stream = PrefixedStream::new(head, tls);

    match (site, kind) {
        (LocalSite::Api, RequestKind::ControlUpgrade) => handle_control(stream, state, peer).await,
        _ => handle_fallback(stream, site, state.fallback_for(site), &state.resolver, peer).await,
    }
}

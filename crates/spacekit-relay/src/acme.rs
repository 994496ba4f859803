//! Loopback HTTP-01 responder.
//!
//! Port-80 tunnels land here while the relay has no valid certificate yet.
//! Pending challenges come from the [`ChallengeStore`] shared with the
//! certificate provider.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::BytesMut;
use spacekit_cert::ChallengeStore;
use spacekit_core::{DEFAULT_MAX_HEADER_BYTES, DEFAULT_SNIFF_TIMEOUT_SECS};
use spacekit_proto::{ACME_CHALLENGE_PREFIX, ParseResult, parse_http_head};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const NOT_FOUND: &str = "HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n";

/// Serves until dropped.
pub struct AcmeResponder {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl AcmeResponder {
    pub async fn bind(challenges: ChallengeStore) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        tokio::spawn(serve(listener, challenges, shutdown.clone()));
        debug!(%addr, "acme responder listening");
        Ok(Self { addr, shutdown })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for AcmeResponder {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve(listener: TcpListener, challenges: ChallengeStore, shutdown: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, _)) => {
                let challenges = challenges.clone();
                tokio::spawn(async move {
                    if let Err(e) = respond(stream, &challenges).await {
                        debug!(error = %e, "acme request failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "acme responder accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn respond(mut stream: TcpStream, challenges: &ChallengeStore) -> io::Result<()> {
    let read = tokio::time::timeout(
        Duration::from_secs(DEFAULT_SNIFF_TIMEOUT_SECS),
        read_response(&mut stream, challenges),
    );
    let response = read.await.map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    // Drain what is left of the request so closing does not reset the peer.
    let mut sink = tokio::io::sink();
    let drain = tokio::io::copy(&mut stream, &mut sink);
    let _ = tokio::time::timeout(Duration::from_secs(1), drain).await;
    Ok(())
}

async fn read_response(stream: &mut TcpStream, challenges: &ChallengeStore) -> io::Result<String> {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        match parse_http_head(&buf, DEFAULT_MAX_HEADER_BYTES) {
            ParseResult::Complete(head) => return Ok(challenge_response(head.path, challenges)),
            ParseResult::Invalid(_) => return Ok(NOT_FOUND.to_string()),
            ParseResult::Incomplete(_) => {}
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    }
}

fn challenge_response(path: &str, challenges: &ChallengeStore) -> String {
    path.strip_prefix(ACME_CHALLENGE_PREFIX)
        .and_then(|token| challenges.get(token))
        .map(|key_authorization| format!("HTTP/1.0 200 OK\r\n\r\n{key_authorization}"))
        .unwrap_or_else(|| NOT_FOUND.to_string())
}

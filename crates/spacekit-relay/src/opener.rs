//! Relay side of `open`: turn a tunnel request into a local connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use spacekit_cert::CertificateProvider;
use spacekit_core::{DEFAULT_INSECURE_PORT, DEFAULT_SECURE_PORT, ERROR_CERTIFICATE};
use spacekit_metrics::record_error;
use spacekit_transport::{BoxedStream, MuxError, OpenRequest, TunnelOpener};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::port_map::PortMap;
use crate::terminate::terminate;

pub struct RelayOpener {
    ports: PortMap,
    /// `None` with `--no-tls`: tunnels carry raw bytes end to end.
    certificate: Option<Arc<dyn CertificateProvider>>,
    acme_addr: Option<SocketAddr>,
    connect_timeout: Duration,
    handshake_timeout: Duration,
    buffer_size: usize,
    /// Set while a background issuance started by `open` is running.
    issuing: Arc<AtomicBool>,
}

impl RelayOpener {
    pub fn new(ports: PortMap, connect_timeout: Duration) -> Self {
        Self {
            ports,
            certificate: None,
            acme_addr: None,
            connect_timeout,
            handshake_timeout: Duration::from_secs(spacekit_core::DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS),
            buffer_size: spacekit_core::DEFAULT_PIPE_BUFFER_SIZE,
            issuing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Terminate TLS with `certificate`; port-80 opens go to `acme_addr`
    /// until it is valid.
    pub fn with_tls(mut self, certificate: Arc<dyn CertificateProvider>, acme_addr: SocketAddr) -> Self {
        self.certificate = Some(certificate);
        self.acme_addr = Some(acme_addr);
        self
    }

    async fn connect(&self, addr: &str) -> Result<TcpStream, MuxError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, format!("connect to {addr} timed out")))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Start issuing in the background unless an issuance from here is
    /// already running. Tunnels never wait for it.
    fn issue_in_background(&self, certificate: &Arc<dyn CertificateProvider>) {
        if self.issuing.swap(true, Ordering::AcqRel) {
            return;
        }
        let certificate = certificate.clone();
        let issuing = self.issuing.clone();
        tokio::spawn(async move {
            if let Err(e) = certificate.ensure_valid_certificate().await {
                record_error(e.error_type());
                warn!(error = %e, "background certificate issuance failed");
            }
            issuing.store(false, Ordering::Release);
        });
    }

    async fn open_plain(&self, port: u16, requested: u16) -> Result<BoxedStream, MuxError> {
        let mapping = self.ports.get(port).ok_or(MuxError::NoMapping(requested))?;
        let stream = self.connect(&mapping.destination()).await?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl TunnelOpener for RelayOpener {
    async fn open(&self, request: &OpenRequest) -> Result<BoxedStream, MuxError> {
        let port = request.port;

        if port == DEFAULT_INSECURE_PORT {
            if let (Some(certificate), Some(acme)) = (&self.certificate, self.acme_addr)
                && !certificate.has_valid_certificate()
            {
                debug!(id = %request.connection_id, "routing port 80 to acme responder");
                let stream = self.connect(&acme.to_string()).await?;
                return Ok(Box::new(stream));
            }
            return self.open_plain(DEFAULT_SECURE_PORT, port).await;
        }

        let Some(certificate) = &self.certificate else {
            return self.open_plain(port, port).await;
        };
        let mapping = self.ports.get(port).ok_or(MuxError::NoMapping(port))?;
        if !certificate.has_valid_certificate() {
            self.issue_in_background(certificate);
        }
        // A certificate inside its renewal window still serves while it renews.
        let Some(config) = certificate.cached_certificate() else {
            record_error(ERROR_CERTIFICATE);
            warn!(id = %request.connection_id, port, "no certificate yet, refusing tunnel");
            return Err(MuxError::Certificate("certificate not issued yet".to_string()));
        };
        let upstream = self.connect(&mapping.destination()).await?;
        Ok(terminate(config, upstream, self.handshake_timeout, self.buffer_size))
    }
}

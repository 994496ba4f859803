//! Accept loops for the secure and plaintext listeners.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use spacekit_auth::AuthBackend;
use spacekit_config::ServiceConfig;
use spacekit_dns::{DynamicDns, LogUpdater};
use spacekit_metrics::{record_connection_accepted, record_connection_closed, record_error};
use spacekit_transport::tls::server_config_from_files;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::handler::{LISTENER_INSECURE, LISTENER_SECURE, handle_insecure, handle_secure};
use crate::registry::RelayRegistry;
use crate::state::{LocalTls, ServiceState};

const HTTP_ALPN: &[&[u8]] = &[b"http/1.1"];

/// Pause after a failed accept, so fd exhaustion does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
enum Listener {
    Secure,
    Insecure,
}

impl Listener {
    fn label(self) -> &'static str {
        match self {
            Listener::Secure => LISTENER_SECURE,
            Listener::Insecure => LISTENER_INSECURE,
        }
    }
}

/// A bound service, ready to run.
pub struct Service {
    state: Arc<ServiceState>,
    secure: TcpListener,
    insecure: TcpListener,
    shutdown_timeout: Duration,
}

impl Service {
    /// Bind both listeners. Bind failures are the only fatal runtime errors.
    pub fn bind(config: &ServiceConfig, state: ServiceState) -> Result<Self, ServiceError> {
        let secure = bind_listener(parse_listen(&config.listen.secure)?, config.listen.backlog)?;
        let insecure = bind_listener(parse_listen(&config.listen.insecure)?, config.listen.backlog)?;
        Ok(Self {
            state: Arc::new(state),
            secure,
            insecure,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        })
    }

    pub fn secure_addr(&self) -> Result<SocketAddr, ServiceError> {
        Ok(self.secure.local_addr()?)
    }

    pub fn insecure_addr(&self) -> Result<SocketAddr, ServiceError> {
        Ok(self.insecure.local_addr()?)
    }

    pub fn registry(&self) -> Arc<RelayRegistry> {
        self.state.registry().clone()
    }

    /// Accept until `shutdown` fires, then close every relay and drain.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let connections = TaskTracker::new();
        info!(
            secure = %self.secure_addr()?,
            insecure = %self.insecure_addr()?,
            api = self.state.router.api_hostname(),
            web = self.state.router.web_hostname(),
            "listening"
        );

        loop {
            let (accepted, listener) = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping accept loops");
                    break;
                }
                result = self.secure.accept() => (result, Listener::Secure),
                result = self.insecure.accept() => (result, Listener::Insecure),
            };
            match accepted {
                Ok((tcp, peer)) => self.spawn_connection(tcp, peer, listener, &connections),
                Err(err) => {
                    warn!(listener = listener.label(), error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        self.state.registry().close_all();
        connections.close();
        if !connections.is_empty() {
            info!(active = connections.len(), "waiting for connections to drain");
            match tokio::time::timeout(self.shutdown_timeout, connections.wait()).await {
                Ok(()) => info!("all connections drained"),
                Err(_) => warn!(active = connections.len(), "shutdown timeout, connections still active"),
            }
        }
        info!("service stopped");
        Ok(())
    }

    fn spawn_connection(
        &self,
        tcp: TcpStream,
        peer: SocketAddr,
        listener: Listener,
        connections: &TaskTracker,
    ) {
        let state = self.state.clone();
        connections.spawn(async move {
            record_connection_accepted(listener.label());
            let _ = tcp.set_nodelay(true);
            debug!(peer = %peer, listener = listener.label(), "new connection");

            let result = match listener {
                Listener::Secure => handle_secure(tcp, state, peer).await,
                Listener::Insecure => handle_insecure(tcp, state, peer).await,
            };

            record_connection_closed();
            if let Err(err) = result {
                record_error(err.error_type());
                debug!(peer = %peer, listener = listener.label(), error = %err, "connection closed with error");
            }
        });
    }
}

fn parse_listen(addr: &str) -> Result<SocketAddr, ServiceError> {
    addr.parse()
        .map_err(|_| ServiceError::Config(format!("invalid listen address: {addr}")))
}

/// TCP listener with `SO_REUSEADDR` and an explicit accept backlog.
fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ServiceError> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;
    Ok(TcpListener::from_std(socket.into())?)
}

/// Load the api/web certificates named in `config`.
pub fn load_local_tls(config: &ServiceConfig) -> Result<LocalTls, ServiceError> {
    Ok(LocalTls {
        api: server_config_from_files(&config.tls.api.cert, &config.tls.api.key, HTTP_ALPN)?,
        web: server_config_from_files(&config.tls.web.cert, &config.tls.web.key, HTTP_ALPN)?,
    })
}

/// Build everything from `config` and run until `shutdown` fires.
pub async fn run_with_shutdown(
    config: ServiceConfig,
    auth: Arc<dyn AuthBackend>,
    shutdown: CancellationToken,
) -> Result<(), ServiceError> {
    let tls = load_local_tls(&config)?;
    let mut state = ServiceState::new(&config, tls, auth)?;
    if config.dns.dynamic {
        info!(api = %config.api_hostname(), "dynamic dns enabled");
        let resolver = state.resolver.clone();
        state = state.with_dynamic_dns(DynamicDns::new(
            Arc::new(LogUpdater),
            resolver,
            config.api_hostname(),
        ));
    }
    Service::bind(&config, state)?.run(shutdown).await
}

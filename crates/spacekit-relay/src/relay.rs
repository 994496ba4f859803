//! Wires a relay together: certificate, ACME responder, opener, dialer and
//! the reconnect controller.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use spacekit_cert::{
    CertificateIssuer, CertificateProvider, ChallengeStore, DirectoryIssuer, ManagedCertificate,
    RenewalPolicy, SelfSignedIssuer,
};
use spacekit_config::ReconnectConfig;
use spacekit_core::{DEFAULT_SECURE_PORT, DEFAULT_SELF_SIGNED_DAYS, DEFAULT_WS_MAX_FRAME_BYTES};
use spacekit_transport::{ChannelConfig, tls};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acme::AcmeResponder;
use crate::backoff::FibonacciBackoff;
use crate::client::ServiceDialer;
use crate::controller::{ControllerHandle, LinkState, ReconnectController};
use crate::error::RelayError;
use crate::opener::RelayOpener;
use crate::port_map::PortMap;

/// Fully resolved relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub relay: String,
    pub username: String,
    pub api_key: String,
    /// Root domain.
    pub host: String,
    /// Subdomain of the service API.
    pub service: String,
    pub ports: PortMap,
    pub no_tls: bool,
    /// TCP address to dial instead of `<service>.<host>:443`.
    pub connect: Option<String>,
    pub insecure: bool,
    pub cert_dir: PathBuf,
    pub self_signed: bool,
    pub reconnect: ReconnectConfig,
    pub ping_interval: Duration,
    pub connect_timeout: Duration,
}

impl RelaySettings {
    /// The public hostname this relay claims.
    pub fn hostname(&self) -> String {
        format!("{}.{}.{}", self.relay, self.username, self.host)
    }

    pub fn service_hostname(&self) -> String {
        format!("{}.{}", self.service, self.host)
    }
}

/// Human-facing summary printed once the relay is reachable.
pub fn banner(hostname: &str, ports: &PortMap) -> String {
    let mut out = format!("Ready! This relay is securely accessible at {hostname}:\n");
    for mapping in ports.iter() {
        let port = if mapping.source_port == DEFAULT_SECURE_PORT {
            String::new()
        } else {
            format!(":{}", mapping.source_port)
        };
        let _ = writeln!(out, "    https://{hostname}{port}/ => {}", mapping.destination());
    }
    out
}

pub struct Relay {
    hostname: String,
    banner: String,
    controller: ReconnectController,
    handle: ControllerHandle,
    certificate: Option<Arc<ManagedCertificate>>,
    _acme: Option<AcmeResponder>,
}

impl Relay {
    pub async fn new(settings: RelaySettings, shutdown: &CancellationToken) -> Result<Self, RelayError> {
        let hostname = settings.hostname();
        let service_hostname = settings.service_hostname();
        let banner = banner(&hostname, &settings.ports);
        let connect_timeout = settings.connect_timeout;

        let mut opener = RelayOpener::new(settings.ports, connect_timeout);
        let (certificate, acme) = if settings.no_tls {
            (None, None)
        } else {
            let issuer: Arc<dyn CertificateIssuer> = if settings.self_signed {
                Arc::new(SelfSignedIssuer::new(DEFAULT_SELF_SIGNED_DAYS))
            } else {
                Arc::new(DirectoryIssuer::new(settings.cert_dir.clone()))
            };
            let challenges = ChallengeStore::new();
            let acme = AcmeResponder::bind(challenges.clone()).await?;
            let certificate = Arc::new(ManagedCertificate::new(
                hostname.clone(),
                issuer,
                challenges,
                RenewalPolicy::default(),
            ));
            opener = opener.with_tls(certificate.clone(), acme.local_addr());
            (Some(certificate), Some(acme))
        };

        let dialer = ServiceDialer::new(
            service_hostname,
            settings.connect,
            settings.relay,
            settings.username,
            settings.api_key,
            tls::client_config(settings.insecure)?,
            connect_timeout,
            DEFAULT_WS_MAX_FRAME_BYTES,
        );
        info!(url = dialer.url(), %hostname, "relay configured");

        let channel = ChannelConfig {
            ping_interval: Some(settings.ping_interval),
            ..ChannelConfig::default()
        };
        let (controller, handle) = ReconnectController::new(
            Arc::new(dialer),
            Arc::new(opener),
            channel,
            FibonacciBackoff::from_config(&settings.reconnect),
            shutdown,
        );

        Ok(Self {
            hostname,
            banner,
            controller,
            handle,
            certificate,
            _acme: acme,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Run until closed. Each time the control channel comes up the
    /// certificate is checked and the banner printed.
    pub async fn run(self) {
        let mut states = self.handle.subscribe();
        let certificate = self.certificate.clone();
        let banner = self.banner.clone();
        let announcer = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                if *states.borrow_and_update() != LinkState::Connected {
                    continue;
                }
                let certificate = certificate.clone();
                let banner = banner.clone();
                tokio::spawn(async move {
                    if let Some(certificate) = certificate {
                        if let Err(e) = certificate.ensure_valid_certificate().await {
                            warn!(error = %e, "certificate unavailable; TLS tunnels will be refused");
                            return;
                        }
                    }
                    print!("{banner}");
                });
            }
        });

        self.controller.run().await;
        announcer.abort();
    }
}

/// Run a relay until `shutdown` is cancelled.
pub async fn run_with_shutdown(settings: RelaySettings, shutdown: CancellationToken) -> Result<(), RelayError> {
    let relay = Relay::new(settings, &shutdown).await?;
    relay.run().await;
    Ok(())
}

//! State shared by every connection the service accepts.

use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig;
use spacekit_auth::AuthBackend;
use spacekit_config::ServiceConfig;
use spacekit_dns::{DnsResolver, DynamicDns};
use spacekit_transport::ChannelConfig;

use crate::error::ServiceError;
use crate::registry::RelayRegistry;
use crate::router::Router;

/// One of the service's own hostnames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSite {
    Api,
    Web,
}

impl LocalSite {
    pub fn as_str(self) -> &'static str {
        match self {
            LocalSite::Api => "api",
            LocalSite::Web => "web",
        }
    }
}

/// TLS configs for the own hostnames.
#[derive(Debug, Clone)]
pub struct LocalTls {
    pub api: Arc<ServerConfig>,
    pub web: Arc<ServerConfig>,
}

pub struct ServiceState {
    pub router: Router,
    pub auth: Arc<dyn AuthBackend>,
    pub tls: LocalTls,
    pub fallback_api: Option<String>,
    pub fallback_web: Option<String>,
    /// Resolves fallback backends and, with dynamic DNS, the API hostname.
    pub resolver: DnsResolver,
    pub dynamic_dns: Option<Arc<DynamicDns>>,
    pub max_header_bytes: usize,
    pub sniff_timeout: Duration,
    pub tls_handshake_timeout: Duration,
    pub ws_max_frame_bytes: usize,
    pub ping_interval: Option<Duration>,
}

impl ServiceState {
    pub fn new(config: &ServiceConfig, tls: LocalTls, auth: Arc<dyn AuthBackend>) -> Result<Self, ServiceError> {
        let router = Router::new(
            config.host.to_ascii_lowercase(),
            config.api_hostname(),
            config.web_hostname(),
            Arc::new(RelayRegistry::new()),
        );
        Ok(Self {
            router,
            auth,
            tls,
            fallback_api: config.fallback.api.clone(),
            fallback_web: config.fallback.web.clone(),
            resolver: DnsResolver::new(&config.dns)?,
            dynamic_dns: None,
            max_header_bytes: config.max_header_bytes,
            sniff_timeout: Duration::from_secs(config.sniff_timeout_secs),
            tls_handshake_timeout: Duration::from_secs(config.tls_handshake_timeout_secs),
            ws_max_frame_bytes: config.ws_max_frame_bytes,
            ping_interval: (config.ping_interval_secs > 0)
                .then(|| Duration::from_secs(config.ping_interval_secs)),
        })
    }

    /// Upsert DNS records for relay hostnames as they register.
    pub fn with_dynamic_dns(mut self, dns: DynamicDns) -> Self {
        self.dynamic_dns = Some(Arc::new(dns));
        self
    }

    pub fn tls_for(&self, site: LocalSite) -> Arc<ServerConfig> {
        match site {
            LocalSite::Api => self.tls.api.clone(),
            LocalSite::Web => self.tls.web.clone(),
        }
    }

    pub fn fallback_for(&self, site: LocalSite) -> Option<&str> {
        match site {
            LocalSite::Api => self.fallback_api.as_deref(),
            LocalSite::Web => self.fallback_web.as_deref(),
        }
    }

    pub fn registry(&self) -> &Arc<RelayRegistry> {
        self.router.registry()
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            ping_interval: self.ping_interval,
            ..ChannelConfig::default()
        }
    }
}

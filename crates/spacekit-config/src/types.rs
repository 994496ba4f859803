//! Configuration type definitions.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use spacekit_dns::DnsConfig;

use crate::defaults::*;

/// Service configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root domain. Relay hostnames are `<subdomain>.<username>.<host>`.
    #[serde(default = "default_host")]
    pub host: String,
    /// Subdomain of the API endpoint (control channels land here).
    #[serde(default = "default_api")]
    pub api: String,
    /// Subdomain of the web endpoint.
    #[serde(default = "default_web")]
    pub web: String,
    #[serde(default)]
    pub listen: ListenConfig,
    pub tls: ServiceTlsConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
    #[serde(default = "default_tls_handshake_timeout_secs")]
    pub tls_handshake_timeout_secs: u64,
    #[serde(default = "default_sniff_timeout_secs")]
    pub sniff_timeout_secs: u64,
    #[serde(default = "default_ws_max_frame_bytes")]
    pub ws_max_frame_bytes: usize,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    pub fn api_hostname(&self) -> String {
        format!("{}.{}", self.api, self.host).to_ascii_lowercase()
    }

    pub fn web_hostname(&self) -> String {
        format!("{}.{}", self.web, self.host).to_ascii_lowercase()
    }

    pub fn relay_hostname(&self, subdomain: &str, username: &str) -> String {
        format!("{subdomain}.{username}.{}", self.host).to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// TLS listener, routed by SNI.
    #[serde(default = "default_secure_listen")]
    pub secure: String,
    /// Plaintext listener, routed by Host (ACME challenges and redirects).
    #[serde(default = "default_insecure_listen")]
    pub insecure: String,
    #[serde(default = "default_connection_backlog")]
    pub backlog: u32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            secure: default_secure_listen(),
            insecure: default_insecure_listen(),
            backlog: default_connection_backlog(),
        }
    }
}

/// PEM certificate chain and private key paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertPair {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Certificates of the service's own endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTlsConfig {
    pub api: CertPair,
    pub web: CertPair,
}

/// `host:port` backends for non-WebSocket requests to the own hostnames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub web: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// ```toml
    /// [[auth.users]]
    /// username = "alice"
    /// apikey_hash = "3f1c...$9a0b..."
    /// ```
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    /// `<salt>$<hex sha256(salt || apikey)>`
    pub apikey_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    /// Prometheus exporter address. Disabled when absent.
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: Option<String>,
    /// Log format: json, pretty, or compact. Default: pretty.
    pub format: Option<String>,
    /// Output target: stdout or stderr. Default: stderr.
    pub output: Option<String>,
    /// Per-module log level filters (e.g., {"spacekit_transport": "debug", "rustls": "warn"}).
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

/// Reconnect backoff settings of a relay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Each delay is stretched by up to this fraction.
    #[serde(default = "default_randomization")]
    pub randomization: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            randomization: default_randomization(),
        }
    }
}

/// Relay configuration file. Every field can also be given on the command
/// line, which wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayFileConfig {
    pub relay: Option<String>,
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub service: Option<String>,
    /// Port mapping strings, e.g. `"443:localhost:8443"`.
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub no_tls: bool,
    pub connect: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    pub cert_dir: Option<PathBuf>,
    #[serde(default)]
    pub self_signed: bool,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            relay: None,
            username: None,
            api_key: None,
            host: None,
            service: None,
            ports: Vec::new(),
            no_tls: false,
            connect: None,
            insecure: false,
            cert_dir: None,
            self_signed: false,
            reconnect: ReconnectConfig::default(),
            ping_interval_secs: default_ping_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

//! CLI override definitions and application logic.

use clap::Parser;

use crate::types::ServiceConfig;

/// Service flags that override values from the config file.
#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Override the TLS listen address, e.g. 0.0.0.0:443
    #[arg(long)]
    pub listen_secure: Option<String>,
    /// Override the plaintext listen address, e.g. 0.0.0.0:80
    #[arg(long)]
    pub listen_insecure: Option<String>,
    /// Override the root domain
    #[arg(long)]
    pub host: Option<String>,
    /// Override metrics listen address
    #[arg(long)]
    pub metrics_listen: Option<String>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Enable dynamic DNS updates for relay hostnames
    #[arg(long)]
    pub dynamic_dns: Option<bool>,
}

pub fn apply_overrides(config: &mut ServiceConfig, overrides: &CliOverrides) {
    if let Some(v) = &overrides.listen_secure {
        config.listen.secure = v.clone();
    }
    if let Some(v) = &overrides.listen_insecure {
        config.listen.insecure = v.clone();
    }
    if let Some(v) = &overrides.host {
        config.host = v.clone();
    }
    if let Some(v) = &overrides.metrics_listen {
        config.metrics.listen = Some(v.clone());
    }
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
    if let Some(v) = overrides.dynamic_dns {
        config.dns.dynamic = v;
    }
}

//! The `[dns]` section of the service config.

use serde::{Deserialize, Serialize};
use spacekit_core::DEFAULT_DNS_CACHE_SIZE;

/// Lookup settings and the dynamic record switch. The whole section is
/// optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Point `<relay>.<user>.<host>` at the service each time a relay
    /// registers.
    pub dynamic: bool,

    pub strategy: DnsStrategy,

    /// `udp://ip[:port]` or `tcp://ip[:port]`, read when `strategy` is
    /// `custom`.
    pub servers: Vec<String>,

    /// Answer with the A record when a name has both A and AAAA.
    pub prefer_ipv4: bool,

    /// Cached answers; 0 turns the cache off.
    pub cache_size: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            dynamic: false,
            strategy: DnsStrategy::System,
            servers: Vec::new(),
            prefer_ipv4: false,
            cache_size: DEFAULT_DNS_CACHE_SIZE,
        }
    }
}

/// Where nameservers come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DnsStrategy {
    /// The host's resolver configuration.
    #[default]
    System,
    /// `DnsConfig::servers`.
    Custom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_take_defaults() {
        let config: DnsConfig = serde_json::from_str(r#"{"prefer_ipv4":true}"#).unwrap();
        assert_eq!(config.strategy, DnsStrategy::System);
        assert_eq!(config.cache_size, DEFAULT_DNS_CACHE_SIZE);
        assert!(config.prefer_ipv4);
        assert!(!config.dynamic);
    }

    #[test]
    fn custom_nameservers() {
        let config: DnsConfig =
            serde_json::from_str(r#"{"strategy":"custom","servers":["udp://9.9.9.9"],"dynamic":true}"#)
                .unwrap();
        assert_eq!(config.strategy, DnsStrategy::Custom);
        assert_eq!(config.servers, ["udp://9.9.9.9"]);
        assert!(config.dynamic);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(serde_json::from_str::<DnsConfig>(r#"{"strategy":"doh"}"#).is_err());
    }
}

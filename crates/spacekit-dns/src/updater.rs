//! DNS record updates for relay hostnames.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::DnsError;
use crate::resolver::DnsResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Cname,
    Txt,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
        })
    }
}

/// Record-management backend.
#[async_trait]
pub trait DnsUpdater: Send + Sync {
    /// Create or replace the `record_type` record of `hostname`.
    async fn upsert(
        &self,
        record_type: RecordType,
        hostname: &str,
        value: &str,
    ) -> Result<(), DnsError>;
}

/// Updater that only logs what it would change.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogUpdater;

#[async_trait]
impl DnsUpdater for LogUpdater {
    async fn upsert(
        &self,
        record_type: RecordType,
        hostname: &str,
        value: &str,
    ) -> Result<(), DnsError> {
        info!(%record_type, hostname, value, "dns upsert");
        Ok(())
    }
}

/// Points relay hostnames at the service's own public address.
///
/// The address is looked up once, from the service's API hostname.
pub struct DynamicDns {
    updater: Arc<dyn DnsUpdater>,
    resolver: DnsResolver,
    api_hostname: String,
    address: OnceCell<Ipv4Addr>,
}

impl DynamicDns {
    pub fn new(updater: Arc<dyn DnsUpdater>, resolver: DnsResolver, api_hostname: impl Into<String>) -> Self {
        Self {
            updater,
            resolver,
            api_hostname: api_hostname.into(),
            address: OnceCell::new(),
        }
    }

    /// Use a known address instead of resolving the API hostname.
    pub fn with_address(self, address: Ipv4Addr) -> Self {
        Self {
            address: OnceCell::new_with(Some(address)),
            ..self
        }
    }

    pub async fn service_address(&self) -> Result<Ipv4Addr, DnsError> {
        self.address
            .get_or_try_init(|| self.resolver.resolve_ipv4(&self.api_hostname))
            .await
            .copied()
    }

    /// Upsert an A record for a newly registered relay hostname.
    ///
    /// Failures, including a service address that does not resolve, are
    /// logged and returned. Registration does not depend on them.
    pub async fn register(&self, hostname: &str) -> Result<(), DnsError> {
        let result = self.upsert_service_address(hostname).await;
        if let Err(ref e) = result {
            warn!(hostname, api_hostname = %self.api_hostname, error = %e, "dynamic dns update failed");
        }
        result
    }

    async fn upsert_service_address(&self, hostname: &str) -> Result<(), DnsError> {
        let address = self.service_address().await?;
        self.updater
            .upsert(RecordType::A, hostname, &address.to_string())
            .await
    }
}

impl fmt::Debug for DynamicDns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicDns")
            .field("api_hostname", &self.api_hostname)
            .field("address", &self.address.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DnsConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(RecordType, String, String)>>,
    }

    #[async_trait]
    impl DnsUpdater for Recorder {
        async fn upsert(
            &self,
            record_type: RecordType,
            hostname: &str,
            value: &str,
        ) -> Result<(), DnsError> {
            self.calls
                .lock()
                .unwrap()
                .push((record_type, hostname.to_string(), value.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn registers_a_record_with_service_address() {
        let recorder = Arc::new(Recorder::default());
        let resolver = DnsResolver::new(&DnsConfig::default()).unwrap();
        let dns = DynamicDns::new(recorder.clone(), resolver, "api.spacekit.test")
            .with_address(Ipv4Addr::new(203, 0, 113, 7));

        dns.register("relay.alice.spacekit.test").await.unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                RecordType::A,
                "relay.alice.spacekit.test".to_string(),
                "203.0.113.7".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn ip_literal_api_host_needs_no_lookup() {
        let resolver = DnsResolver::new(&DnsConfig::default()).unwrap();
        let dns = DynamicDns::new(Arc::new(LogUpdater), resolver, "198.51.100.1");
        assert_eq!(dns.service_address().await.unwrap(), Ipv4Addr::new(198, 51, 100, 1));
        dns.register("relay.bob.spacekit.test").await.unwrap();
    }

    #[tokio::test]
    async fn unresolvable_service_address_skips_the_update() {
        let recorder = Arc::new(Recorder::default());
        let resolver = DnsResolver::new(&DnsConfig::default()).unwrap();
        // Empty label: rejected before any query is sent.
        let dns = DynamicDns::new(recorder.clone(), resolver, "api..spacekit.test");

        dns.register("relay.carol.spacekit.test").await.unwrap_err();

        assert!(recorder.calls.lock().unwrap().is_empty());
        assert!(dns.address.get().is_none());
    }
}

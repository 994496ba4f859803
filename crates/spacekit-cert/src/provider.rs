//! Memoized, single-flight certificate for one hostname.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use parking_lot::RwLock;
use spacekit_core::{
    DEFAULT_CERT_DNS_RETRY_DEADLINE_SECS, DEFAULT_CERT_DNS_RETRY_INTERVAL_SECS,
    DEFAULT_CERT_RENEW_BEFORE_SECS,
};
use tracing::{debug, info, warn};

use crate::challenge::ChallengeStore;
use crate::error::CertificateError;
use crate::issuer::CertificateIssuer;

/// What the relay needs from its certificate source.
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    /// A server config with a certificate that is not about to expire,
    /// issuing or renewing one first if needed.
    async fn ensure_valid_certificate(&self) -> Result<Arc<rustls::ServerConfig>, CertificateError>;

    /// Whether a certificate outside its renewal window is cached right now.
    fn has_valid_certificate(&self) -> bool;

    /// The cached config if it has not expired, renewal window or not.
    /// Never issues.
    fn cached_certificate(&self) -> Option<Arc<rustls::ServerConfig>>;
}

#[derive(Debug, Clone, Copy)]
pub struct RenewalPolicy {
    /// Renew once expiry is closer than this.
    pub renew_before: Duration,
    /// Wait between retryable issuance failures.
    pub retry_interval: Duration,
    /// Give up retrying after this long.
    pub retry_deadline: Duration,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            renew_before: Duration::from_secs(DEFAULT_CERT_RENEW_BEFORE_SECS),
            retry_interval: Duration::from_secs(DEFAULT_CERT_DNS_RETRY_INTERVAL_SECS),
            retry_deadline: Duration::from_secs(DEFAULT_CERT_DNS_RETRY_DEADLINE_SECS),
        }
    }
}

struct Cached {
    config: Arc<rustls::ServerConfig>,
    not_after: SystemTime,
}

pub struct ManagedCertificate {
    hostname: String,
    issuer: Arc<dyn CertificateIssuer>,
    challenges: ChallengeStore,
    policy: RenewalPolicy,
    current: RwLock<Option<Cached>>,
    issuing: tokio::sync::Mutex<()>,
}

impl ManagedCertificate {
    pub fn new(
        hostname: impl Into<String>,
        issuer: Arc<dyn CertificateIssuer>,
        challenges: ChallengeStore,
        policy: RenewalPolicy,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            issuer,
            challenges,
            policy,
            current: RwLock::new(None),
            issuing: tokio::sync::Mutex::new(()),
        }
    }

    #[inline]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[inline]
    pub fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    fn fresh(&self) -> Option<Arc<rustls::ServerConfig>> {
        let current = self.current.read();
        let cached = current.as_ref()?;
        let renew_at = cached.not_after.checked_sub(self.policy.renew_before)?;
        (SystemTime::now() < renew_at).then(|| cached.config.clone())
    }

    /// Cached config that has not expired yet, even if inside the renewal window.
    fn unexpired(&self) -> Option<Arc<rustls::ServerConfig>> {
        let current = self.current.read();
        let cached = current.as_ref()?;
        (SystemTime::now() < cached.not_after).then(|| cached.config.clone())
    }

    async fn issue_with_retry(&self) -> Result<crate::CertificateBundle, CertificateError> {
        let started = Instant::now();
        loop {
            match self.issuer.issue(&self.hostname, &self.challenges).await {
                Ok(bundle) => return Ok(bundle),
                Err(e) if e.is_retryable() => {
                    if started.elapsed() + self.policy.retry_interval > self.policy.retry_deadline {
                        return Err(CertificateError::DeadlineExceeded {
                            hostname: self.hostname.clone(),
                            secs: self.policy.retry_deadline.as_secs(),
                            last: Box::new(e),
                        });
                    }
                    debug!(hostname = %self.hostname, error = %e, "certificate not ready, retrying");
                    tokio::time::sleep(self.policy.retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for ManagedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedCertificate")
            .field("hostname", &self.hostname)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CertificateProvider for ManagedCertificate {
    async fn ensure_valid_certificate(&self) -> Result<Arc<rustls::ServerConfig>, CertificateError> {
        if let Some(config) = self.fresh() {
            return Ok(config);
        }

        let _flight = self.issuing.lock().await;
        if let Some(config) = self.fresh() {
            return Ok(config);
        }

        let bundle = match self.issue_with_retry().await {
            Ok(bundle) => bundle,
            Err(e) => {
                if let Some(config) = self.unexpired() {
                    warn!(hostname = %self.hostname, error = %e, "renewal failed, keeping current certificate");
                    return Ok(config);
                }
                return Err(e);
            }
        };
        let config = bundle.server_config()?;
        *self.current.write() = Some(Cached {
            config: config.clone(),
            not_after: bundle.not_after(),
        });
        info!(hostname = %self.hostname, "certificate ready");
        Ok(config)
    }

    fn has_valid_certificate(&self) -> bool {
        self.fresh().is_some()
    }

    fn cached_certificate(&self) -> Option<Arc<rustls::ServerConfig>> {
        self.unexpired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::CertificateBundle;
    use crate::generate::self_signed_pem;
    use crate::issuer::SelfSignedIssuer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOST: &str = "relay.alice.spacekit.test";

    /// Fails with `DnsNotReady` a fixed number of times, then issues.
    struct FlakyIssuer {
        failures: usize,
        days: u32,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CertificateIssuer for FlakyIssuer {
        async fn issue(
            &self,
            hostname: &str,
            _challenges: &ChallengeStore,
        ) -> Result<CertificateBundle, CertificateError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if call < self.failures {
                return Err(CertificateError::DnsNotReady(hostname.to_string()));
            }
            let (cert, key) = self_signed_pem(&[hostname.to_string()], &[], self.days)?;
            CertificateBundle::from_pem(cert.as_bytes(), key.as_bytes())
        }
    }

    fn fast_policy() -> RenewalPolicy {
        RenewalPolicy {
            renew_before: Duration::from_secs(7 * 86_400),
            retry_interval: Duration::from_millis(20),
            retry_deadline: Duration::from_millis(500),
        }
    }

    fn managed(issuer: Arc<dyn CertificateIssuer>) -> ManagedCertificate {
        ManagedCertificate::new(HOST, issuer, ChallengeStore::new(), fast_policy())
    }

    #[tokio::test]
    async fn issues_once_and_caches() {
        let cert = managed(Arc::new(SelfSignedIssuer::new(30)));
        assert!(!cert.has_valid_certificate());
        let first = cert.ensure_valid_certificate().await.unwrap();
        assert!(cert.has_valid_certificate());
        let second = cert.ensure_valid_certificate().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_issuance() {
        let issuer = Arc::new(FlakyIssuer {
            failures: 0,
            days: 30,
            calls: AtomicUsize::new(0),
        });
        let cert = Arc::new(managed(issuer.clone()));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let cert = cert.clone();
            tasks.push(tokio::spawn(async move { cert.ensure_valid_certificate().await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_dns_is_ready() {
        let issuer = Arc::new(FlakyIssuer {
            failures: 2,
            days: 30,
            calls: AtomicUsize::new(0),
        });
        let cert = managed(issuer.clone());
        cert.ensure_valid_certificate().await.unwrap();
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_deadline() {
        let issuer = Arc::new(FlakyIssuer {
            failures: usize::MAX,
            days: 30,
            calls: AtomicUsize::new(0),
        });
        let cert = managed(issuer);
        let err = cert.ensure_valid_certificate().await.unwrap_err();
        assert!(matches!(err, CertificateError::DeadlineExceeded { .. }));
        assert!(!cert.has_valid_certificate());
    }

    #[tokio::test]
    async fn short_lived_certificate_is_renewed() {
        // 3 days of validity sits inside the 7 day renewal window.
        let issuer = Arc::new(FlakyIssuer {
            failures: 0,
            days: 3,
            calls: AtomicUsize::new(0),
        });
        let cert = managed(issuer.clone());
        cert.ensure_valid_certificate().await.unwrap();
        cert.ensure_valid_certificate().await.unwrap();
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
        assert!(!cert.has_valid_certificate());
        assert!(cert.cached_certificate().is_some());
    }

    #[tokio::test]
    async fn nothing_cached_before_first_issuance() {
        let cert = managed(Arc::new(SelfSignedIssuer::new(30)));
        assert!(cert.cached_certificate().is_none());
        cert.ensure_valid_certificate().await.unwrap();
        assert!(cert.cached_certificate().is_some());
    }
}

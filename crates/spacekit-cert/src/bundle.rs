//! A parsed certificate chain, its key and its expiry.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use spacekit_transport::tls;

use crate::error::CertificateError;

const ALPN_HTTP11: &[u8] = b"http/1.1";

#[derive(Debug)]
pub struct CertificateBundle {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    not_after: SystemTime,
}

impl CertificateBundle {
    /// Parse a PEM chain (leaf first) and private key. The expiry is read from
    /// the leaf certificate.
    pub fn from_pem(chain_pem: &[u8], key_pem: &[u8]) -> Result<Self, CertificateError> {
        let chain = tls::certs_from_pem(chain_pem)?;
        let key = tls::key_from_pem(key_pem)?;
        let not_after = leaf_not_after(&chain[0])?;
        Ok(Self {
            chain,
            key,
            not_after,
        })
    }

    #[inline]
    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    /// Whether `now` falls inside the renewal window before expiry.
    pub fn needs_renewal(&self, now: SystemTime, renew_before: Duration) -> bool {
        match self.not_after.checked_sub(renew_before) {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    /// Server config for terminating TLS with this certificate.
    pub fn server_config(&self) -> Result<Arc<rustls::ServerConfig>, CertificateError> {
        Ok(tls::server_config(
            self.chain.clone(),
            self.key.clone_key(),
            &[ALPN_HTTP11],
        )?)
    }
}

fn leaf_not_after(leaf: &CertificateDer<'_>) -> Result<SystemTime, CertificateError> {
    let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref())
        .map_err(|e| CertificateError::Parse(e.to_string()))?;
    let secs = cert.validity().not_after.timestamp();
    let secs = u64::try_from(secs)
        .map_err(|_| CertificateError::Parse(format!("expiry before epoch: {secs}")))?;
    Ok(UNIX_EPOCH + Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::self_signed_pem;

    #[test]
    fn reads_expiry_from_leaf() {
        let (cert, key) = self_signed_pem(&["relay.alice.spacekit.test".into()], &[], 30).unwrap();
        let bundle = CertificateBundle::from_pem(cert.as_bytes(), key.as_bytes()).unwrap();

        let remaining = bundle
            .not_after()
            .duration_since(SystemTime::now())
            .unwrap();
        let day = Duration::from_secs(86_400);
        assert!(remaining > 29 * day && remaining <= 30 * day);
    }

    #[test]
    fn renewal_window() {
        let (cert, key) = self_signed_pem(&["a.b.c".into()], &[], 10).unwrap();
        let bundle = CertificateBundle::from_pem(cert.as_bytes(), key.as_bytes()).unwrap();
        let week = Duration::from_secs(7 * 86_400);
        let now = SystemTime::now();

        assert!(!bundle.needs_renewal(now, week));
        assert!(bundle.needs_renewal(now + Duration::from_secs(4 * 86_400), week));
        assert!(bundle.server_config().is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(CertificateBundle::from_pem(b"nope", b"nope").is_err());
    }
}

//! Certificate error types.

use spacekit_core::ERROR_CERTIFICATE;
use spacekit_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("certificate generation failed: {0}")]
    Generation(String),

    #[error("invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("invalid certificate: {0}")]
    Parse(String),

    #[error("tls config: {0}")]
    Tls(#[from] TransportError),

    /// The hostname does not resolve to us yet, so validation cannot pass.
    #[error("dns not ready for {0}")]
    DnsNotReady(String),

    /// Issuance is in progress elsewhere; the certificate is not on disk yet.
    #[error("certificate for {0} is pending")]
    Pending(String),

    #[error("gave up issuing certificate for {hostname} after {secs}s: {last}")]
    DeadlineExceeded {
        hostname: String,
        secs: u64,
        last: Box<CertificateError>,
    },
}

impl CertificateError {
    /// Whether issuance should be retried after a short wait.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DnsNotReady(_) | Self::Pending(_))
    }

    #[inline]
    pub fn error_type(&self) -> &'static str {
        ERROR_CERTIFICATE
    }
}

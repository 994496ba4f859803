//! Certificate issuers.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::CertificateBundle;
use crate::challenge::ChallengeStore;
use crate::error::CertificateError;
use crate::generate::self_signed_pem;

pub(crate) const FULLCHAIN_FILE: &str = "fullchain.pem";
pub(crate) const PRIVKEY_FILE: &str = "privkey.pem";
const CHALLENGE_DIR: &str = ".well-known/acme-challenge";

/// Produces a certificate for a hostname.
///
/// Issuers that validate over HTTP-01 publish their tokens to `challenges`;
/// the relay serves them to the CA through its ACME responder.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue(
        &self,
        hostname: &str,
        challenges: &ChallengeStore,
    ) -> Result<CertificateBundle, CertificateError>;
}

/// Reads certificates that an external ACME client keeps under
/// `<dir>/<hostname>/{fullchain,privkey}.pem`.
///
/// While the files are missing, challenge files the client left under
/// `<dir>/<hostname>/.well-known/acme-challenge/` are published to the
/// challenge store and issuance reports [`CertificateError::Pending`].
#[derive(Debug, Clone)]
pub struct DirectoryIssuer {
    dir: PathBuf,
}

impl DirectoryIssuer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn host_dir(&self, hostname: &str) -> PathBuf {
        self.dir.join(hostname)
    }
}

#[async_trait]
impl CertificateIssuer for DirectoryIssuer {
    async fn issue(
        &self,
        hostname: &str,
        challenges: &ChallengeStore,
    ) -> Result<CertificateBundle, CertificateError> {
        let host_dir = self.host_dir(hostname);
        let chain = tokio::fs::read(host_dir.join(FULLCHAIN_FILE)).await;
        let key = tokio::fs::read(host_dir.join(PRIVKEY_FILE)).await;
        match (chain, key) {
            (Ok(chain), Ok(key)) => CertificateBundle::from_pem(&chain, &key),
            (Err(e), _) | (_, Err(e)) if e.kind() == ErrorKind::NotFound => {
                let published = publish_challenges(&host_dir.join(CHALLENGE_DIR), challenges).await?;
                debug!(hostname, published, "certificate not on disk yet");
                Err(CertificateError::Pending(hostname.to_string()))
            }
            (Err(e), _) | (_, Err(e)) => Err(e.into()),
        }
    }
}

async fn publish_challenges(dir: &Path, challenges: &ChallengeStore) -> Result<usize, CertificateError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut published = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(token) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let key_authorization = tokio::fs::read_to_string(entry.path()).await?;
        challenges.insert(token, key_authorization.trim());
        published += 1;
    }
    Ok(published)
}

/// Issues an in-memory self-signed certificate. Clients must not verify it.
#[derive(Debug, Clone, Copy)]
pub struct SelfSignedIssuer {
    days: u32,
}

impl SelfSignedIssuer {
    pub fn new(days: u32) -> Self {
        Self { days }
    }
}

impl Default for SelfSignedIssuer {
    fn default() -> Self {
        Self::new(spacekit_core::DEFAULT_SELF_SIGNED_DAYS)
    }
}

#[async_trait]
impl CertificateIssuer for SelfSignedIssuer {
    async fn issue(
        &self,
        hostname: &str,
        _challenges: &ChallengeStore,
    ) -> Result<CertificateBundle, CertificateError> {
        let (cert, key) = self_signed_pem(&[hostname.to_string()], &[], self.days)?;
        CertificateBundle::from_pem(cert.as_bytes(), key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_issuer_reads_pem_files() {
        let tmp = tempfile::tempdir().unwrap();
        let issuer = DirectoryIssuer::new(tmp.path());
        let host_dir = issuer.host_dir("relay.alice.spacekit.test");
        std::fs::create_dir_all(&host_dir).unwrap();
        let (cert, key) = self_signed_pem(&["relay.alice.spacekit.test".into()], &[], 30).unwrap();
        std::fs::write(host_dir.join(FULLCHAIN_FILE), cert).unwrap();
        std::fs::write(host_dir.join(PRIVKEY_FILE), key).unwrap();

        let bundle = issuer
            .issue("relay.alice.spacekit.test", &ChallengeStore::new())
            .await
            .unwrap();
        assert!(bundle.server_config().is_ok());
    }

    #[tokio::test]
    async fn missing_certificate_publishes_challenges() {
        let tmp = tempfile::tempdir().unwrap();
        let issuer = DirectoryIssuer::new(tmp.path());
        let challenge_dir = issuer.host_dir("relay.alice.spacekit.test").join(CHALLENGE_DIR);
        std::fs::create_dir_all(&challenge_dir).unwrap();
        std::fs::write(challenge_dir.join("tok123"), "tok123.thumbprint\n").unwrap();

        let store = ChallengeStore::new();
        let err = issuer
            .issue("relay.alice.spacekit.test", &store)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.get("tok123").as_deref(), Some("tok123.thumbprint"));
    }

    #[tokio::test]
    async fn self_signed_issuer_covers_hostname() {
        let bundle = SelfSignedIssuer::new(1)
            .issue("relay.alice.spacekit.test", &ChallengeStore::new())
            .await
            .unwrap();
        assert!(bundle.not_after() > std::time::SystemTime::now());
    }
}

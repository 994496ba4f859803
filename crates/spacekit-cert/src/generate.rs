//! Self-signed certificate generation.

use std::fs;
use std::net::IpAddr;

use rcgen::{CertificateParams, KeyPair, PKCS_ECDSA_P256_SHA256, SanType};

use crate::cli::{GenerateArgs, parent};
use crate::error::CertificateError;

/// Generate a self-signed ECDSA P-256 certificate, returning `(cert_pem, key_pem)`.
pub fn self_signed_pem(
    domains: &[String],
    ips: &[IpAddr],
    days: u32,
) -> Result<(String, String), CertificateError> {
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;

    let mut params = CertificateParams::default();
    for domain in domains {
        let name = domain
            .clone()
            .try_into()
            .map_err(|_| CertificateError::InvalidDomain(domain.clone()))?;
        params.subject_alt_names.push(SanType::DnsName(name));
    }
    for ip in ips {
        params.subject_alt_names.push(SanType::IpAddress(*ip));
    }

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::minutes(5);
    params.not_after = now + time::Duration::days(i64::from(days));

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertificateError::Generation(e.to_string()))?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}

/// `cert generate`: write a self-signed pair where the chosen layout puts it.
pub fn generate(args: &GenerateArgs) -> Result<(), CertificateError> {
    let (cert_pem, key_pem) = self_signed_pem(&args.domains, &args.ips, args.days)?;

    let (cert_path, key_path) = args.paths();
    fs::create_dir_all(parent(&cert_path))?;
    fs::write(&cert_path, cert_pem)?;
    fs::write(&key_path, key_pem)?;

    println!("wrote {} ({} days)", cert_path.display(), args.days);
    println!("wrote {}", key_path.display());
    let mut names = args.domains.clone();
    names.extend(args.ips.iter().map(ToString::to_string));
    println!("subject alternative names: {}", names.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Layout;
    use crate::issuer::{CertificateIssuer, DirectoryIssuer};
    use crate::challenge::ChallengeStore;

    #[test]
    fn writes_pem_pair() {
        let dir = tempfile::tempdir().unwrap();
        let args = GenerateArgs {
            domains: vec!["api.spacekit.test".into()],
            ips: vec!["127.0.0.1".parse().unwrap()],
            output: dir.path().to_path_buf(),
            layout: Layout::Pair,
            name: "api".into(),
            days: 5,
        };
        generate(&args).unwrap();

        let cert = fs::read_to_string(dir.path().join("api.pem")).unwrap();
        let key = fs::read_to_string(dir.path().join("api-key.pem")).unwrap();
        assert!(cert.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(key.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn store_layout_is_readable_by_directory_issuer() {
        let dir = tempfile::tempdir().unwrap();
        let args = GenerateArgs {
            domains: vec!["web.alice.spacekit.test".into()],
            ips: vec![],
            output: dir.path().to_path_buf(),
            layout: Layout::Store,
            name: "unused".into(),
            days: 30,
        };
        generate(&args).unwrap();

        let issuer = DirectoryIssuer::new(dir.path());
        let bundle = issuer
            .issue("web.alice.spacekit.test", &ChallengeStore::default())
            .await
            .unwrap();
        assert!(!bundle.needs_renewal(std::time::SystemTime::now(), std::time::Duration::from_secs(86_400)));
    }

    #[test]
    fn rejects_invalid_domain() {
        let err = self_signed_pem(&["bücher.example".into()], &[], 1).unwrap_err();
        assert!(matches!(err, CertificateError::InvalidDomain(_)));
    }
}

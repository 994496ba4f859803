//! Relay certificate management for spacekit.
//!
//! A relay terminates TLS for its own hostname, so it needs a certificate for
//! `<relay>.<username>.<host>`. [`ManagedCertificate`] memoizes one, renews it
//! when it gets close to expiry, and funnels concurrent callers through a
//! single issuance. Issuance itself is delegated to a [`CertificateIssuer`]:
//!
//! - [`DirectoryIssuer`] reads PEM files written by an external ACME client
//!   and publishes its pending HTTP-01 challenges to a [`ChallengeStore`]
//! - [`SelfSignedIssuer`] generates a certificate in memory
//!
//! The `cert generate` CLI writes self-signed PEM pairs for development, either
//! as a named pair or in the per-host layout `DirectoryIssuer` reads.
//!
//! ```bash
//! spacekit cert generate --domain api.spacekit.test --domain www.spacekit.test
//! ```

mod bundle;
mod challenge;
pub mod cli;
mod error;
pub mod generate;
mod issuer;
mod provider;

pub use bundle::CertificateBundle;
pub use challenge::ChallengeStore;
pub use cli::{CertArgs, CertCommands, GenerateArgs, Layout};
pub use error::CertificateError;
pub use generate::{generate, self_signed_pem};
pub use issuer::{CertificateIssuer, DirectoryIssuer, SelfSignedIssuer};
pub use provider::{CertificateProvider, ManagedCertificate, RenewalPolicy};

/// Run the cert CLI with the given arguments.
pub fn run(args: CertArgs) -> Result<(), CertificateError> {
    match args.command {
        CertCommands::Generate(args) => generate(&args),
    }
}

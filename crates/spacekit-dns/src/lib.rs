//! Name resolution and record updates for the spacekit service.
//!
//! The service resolves fallback backends and its own public address through
//! [`DnsResolver`], a cached `hickory-resolver` front end. With
//! `dns.dynamic` set, [`DynamicDns`] asks a [`DnsUpdater`] to point every
//! newly registered relay hostname at that address.
//!
//! ```rust,no_run
//! use spacekit_dns::{DnsConfig, DnsResolver};
//!
//! # async fn lookup() -> Result<(), spacekit_dns::DnsError> {
//! let resolver = DnsResolver::new(&DnsConfig::default())?;
//! let backend = resolver.resolve("www.spacekit.io:443").await?;
//! # let _ = backend;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod resolver;
mod updater;

pub use config::{DnsConfig, DnsStrategy};
pub use error::DnsError;
pub use resolver::{DnsResolver, split_host_port};
pub use updater::{DnsUpdater, DynamicDns, LogUpdater, RecordType};

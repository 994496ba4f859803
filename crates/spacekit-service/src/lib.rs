//! The public-facing spacekit service.
//!
//! Two listeners: TLS connections are routed by SNI, plaintext ones by
//! `Host` header. The service's own api/web hostnames are served locally (the
//! api hostname also accepts relay control channels); every other hostname is
//! tunneled to whichever relay registered it.

pub mod cli;
mod error;
mod handler;
mod registry;
mod router;
mod server;
mod sniff;
mod state;
mod ws;

pub use error::ServiceError;
pub use registry::RelayRegistry;
pub use router::{InsecureRoute, Router, SecureRoute};
pub use server::{Service, load_local_tls, run_with_shutdown};
pub use state::{LocalSite, LocalTls, ServiceState};
pub use tokio_util::sync::CancellationToken;
pub use ws::Credentials;

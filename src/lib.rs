//! # spacekit
//!
//! Reverse tunnel service and relay. The service routes public TLS and
//! ACME traffic by hostname to relays, which connect out to it over a
//! WebSocket control channel and forward tunnels to local ports.
//!
//! ## Crates
//!
//! - [`spacekit_core`] - defaults, error labels, stream primitives
//! - [`spacekit_proto`] - frame codec and hostname sniffers
//! - [`spacekit_transport`] - control channel and socket multiplexer
//! - [`spacekit_auth`] - API key verification
//! - [`spacekit_cert`] - certificate provisioning
//! - [`spacekit_dns`] - resolver and dynamic DNS
//! - [`spacekit_config`] - configuration loading and validation
//! - [`spacekit_metrics`] - Prometheus metrics
//! - [`spacekit_service`] - the service
//! - [`spacekit_relay`] - the relay

pub use spacekit_auth as auth;
pub use spacekit_cert as cert;
pub use spacekit_config as config;
pub use spacekit_core as core;
pub use spacekit_dns as dns;
pub use spacekit_metrics as metrics;
pub use spacekit_proto as proto;
pub use spacekit_relay as relay;
pub use spacekit_service as service;
pub use spacekit_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use spacekit_auth::{AuthBackend, MemoryAuth, ReloadableAuth};
    pub use spacekit_config::{
        RelayFileConfig, ServiceConfig, load_relay_config, load_service_config,
        validate_service_config,
    };
    pub use spacekit_relay::{PortMap, Relay, RelaySettings};
    pub use spacekit_service::{CancellationToken, Service, ServiceError, run_with_shutdown};
}

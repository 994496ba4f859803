//! spacekit relay.
//!
//! Keeps a control channel open to the service and serves the tunnels it
//! opens:
//!
//! - [`PortMap`]: which local destination each tunneled port reaches
//! - [`ReconnectController`]: dial, run, back off, redial
//! - [`RelayOpener`]: `open` requests to local sockets, with TLS termination
//!   and the loopback ACME responder for port 80

pub mod cli;

mod acme;
mod backoff;
mod client;
mod controller;
mod error;
mod opener;
mod port_map;
mod relay;
mod terminate;

pub use acme::AcmeResponder;
pub use backoff::FibonacciBackoff;
pub use client::ServiceDialer;
pub use controller::{ControllerHandle, Dialer, LinkState, ReconnectController};
pub use error::RelayError;
pub use opener::RelayOpener;
pub use port_map::{PortMap, PortMapError, PortMapping};
pub use relay::{Relay, RelaySettings, banner, run_with_shutdown};
pub use terminate::terminate;
pub use tokio_util::sync::CancellationToken;

//! Configuration for the spacekit service and relay.
//!
//! - [`ServiceConfig`]: the service's config file
//! - [`RelayFileConfig`]: optional file seeding the relay's command line
//!
//! Files are JSON (comments allowed with `.jsonc`), YAML or TOML, picked by
//! extension. [`LoggingConfig::init`] installs the tracing subscriber either
//! binary logs through.

mod cli;
mod defaults;
mod loader;
mod logging;
mod types;
mod validate;

pub use cli::{CliOverrides, apply_overrides};
pub use loader::{ConfigError, Format, load_config, load_relay_config, load_service_config};
pub use spacekit_dns::{DnsConfig, DnsStrategy};
pub use types::*;
pub use validate::{validate_reconnect, validate_relay_config, validate_service_config};

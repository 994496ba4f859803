//! `spacekit service` command line, shared by the standalone binary and the
//! unified CLI.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use spacekit_auth::{AuthError, MemoryAuth, ReloadableAuth};
use spacekit_config::{
    CliOverrides, ConfigError, ServiceConfig, apply_overrides, load_service_config,
    validate_service_config,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::run_with_shutdown;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "spacekit-service",
    version,
    about = "Route public TLS and HTTP traffic to connected spacekit relays"
)]
pub struct ServiceArgs {
    /// Service config (.json, .jsonc, .yaml, .yml or .toml).
    #[arg(short, long, value_name = "FILE", default_value = "service.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

impl ServiceArgs {
    /// Read the config file, layer the command line over it and validate.
    pub fn load(&self) -> Result<ServiceConfig, ConfigError> {
        let mut config = load_service_config(&self.config)?;
        apply_overrides(&mut config, &self.overrides);
        validate_service_config(&config)?;
        Ok(config)
    }
}

/// The `auth.users` table, usernames folded to lower case the same way
/// relay hostnames are.
fn users(config: &ServiceConfig) -> Result<MemoryAuth, AuthError> {
    let entries = config
        .auth
        .users
        .iter()
        .map(|user| (user.username.to_ascii_lowercase(), user.apikey_hash.clone()));
    MemoryAuth::from_hashed(entries)
}

pub async fn run(args: ServiceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.load()?;
    config.logging.init();

    if let Some(listen) = config.metrics.listen.as_deref() {
        if let Err(e) = spacekit_metrics::init_prometheus(listen) {
            warn!(error = %e, "metrics exporter disabled");
        } else {
            info!(listen, "metrics exporter listening");
        }
    }

    let auth = Arc::new(ReloadableAuth::new(users(&config)?));
    info!(users = auth.user_count(), "auth users loaded");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            spacekit_core::signal::terminated(|signal, e| {
                warn!(signal, error = %e, "cannot listen for signal");
            })
            .await;
            info!("shutting down");
            shutdown.cancel();
        }
    });

    #[cfg(unix)]
    tokio::spawn(reload_users_on_sighup(args, auth.clone()));

    run_with_shutdown(config, auth, shutdown).await?;
    Ok(())
}

/// SIGHUP re-reads the config file and swaps in its `auth.users`. Nothing
/// else in the file takes effect before a restart.
#[cfg(unix)]
async fn reload_users_on_sighup(args: ServiceArgs, auth: Arc<ReloadableAuth>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGHUP, user reload disabled");
            return;
        }
    };

    while hangups.recv().await.is_some() {
        let reloaded = args
            .load()
            .map_err(|e| e.to_string())
            .and_then(|config| users(&config).map_err(|e| e.to_string()));
        match reloaded {
            Ok(table) => {
                let before = auth.replace(table);
                info!(before, after = auth.user_count(), "auth users reloaded");
            }
            Err(e) => warn!(error = %e, "auth reload failed, keeping current users"),
        }
    }
}

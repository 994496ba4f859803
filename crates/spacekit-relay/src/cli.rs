//! CLI entry point for the relay subcommand.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use spacekit_config::{RelayFileConfig, load_relay_config, validate_relay_config};
use spacekit_core::{DEFAULT_API_SUBDOMAIN, DEFAULT_CERT_DIR, DEFAULT_HOST};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::port_map::PortMap;
use crate::relay::{RelaySettings, run_with_shutdown};

/// CLI arguments for the relay subcommand.
///
/// `-h` selects the host, so help is only available as `--help`.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "spacekit-relay",
    version,
    about = "Expose local services through a spacekit service",
    disable_help_flag = true
)]
pub struct RelayArgs {
    /// Relay name; the public hostname is <relay>.<username>.<host>.
    #[arg(short = 'r', long)]
    pub relay: Option<String>,

    #[arg(short = 'u', long)]
    pub username: Option<String>,

    #[arg(short = 'a', long, env = "SPACEKIT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Root domain of the service [default: spacekit.io].
    #[arg(short = 'h', long)]
    pub host: Option<String>,

    /// Subdomain of the service API [default: api].
    #[arg(short = 's', long)]
    pub service: Option<String>,

    /// Port mapping `[sourcePort:][hostname:]destinationPort`. Repeatable.
    #[arg(short = 'p', long = "port")]
    pub ports: Vec<String>,

    /// Tunnel raw bytes without terminating TLS.
    #[arg(long)]
    pub no_tls: bool,

    /// Dial this address instead of <service>.<host>:443.
    #[arg(long)]
    pub connect: Option<String>,

    /// Do not verify the service certificate.
    #[arg(long)]
    pub insecure: bool,

    /// Directory holding <hostname>/fullchain.pem and privkey.pem.
    #[arg(long)]
    pub cert_dir: Option<PathBuf>,

    /// Use an in-memory self-signed certificate.
    #[arg(long)]
    pub self_signed: bool,

    /// Config file (json, jsonc, yaml or toml).
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long)]
    pub metrics_listen: Option<String>,

    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl RelayArgs {
    /// Overlay the command line on the file config.
    fn merge(&self, mut file: RelayFileConfig) -> RelayFileConfig {
        fn pick(cli: &Option<String>, file: &mut Option<String>) {
            if cli.is_some() {
                file.clone_from(cli);
            }
        }
        pick(&self.relay, &mut file.relay);
        pick(&self.username, &mut file.username);
        pick(&self.api_key, &mut file.api_key);
        pick(&self.host, &mut file.host);
        pick(&self.service, &mut file.service);
        pick(&self.connect, &mut file.connect);
        pick(&self.metrics_listen, &mut file.metrics.listen);
        pick(&self.log_level, &mut file.logging.level);
        if !self.ports.is_empty() {
            file.ports.clone_from(&self.ports);
        }
        if self.cert_dir.is_some() {
            file.cert_dir.clone_from(&self.cert_dir);
        }
        file.no_tls |= self.no_tls;
        file.insecure |= self.insecure;
        file.self_signed |= self.self_signed;
        file
    }

    /// Load the file config (if any) and merge the command line over it.
    pub fn load(&self) -> Result<RelayFileConfig, RelayError> {
        let file = match &self.config {
            Some(path) => load_relay_config(path).map_err(|e| RelayError::Config(e.to_string()))?,
            None => RelayFileConfig::default(),
        };
        let merged = self.merge(file);
        validate_relay_config(&merged).map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(merged)
    }
}

fn required(value: Option<String>, flag: &str) -> Result<String, RelayError> {
    value.ok_or_else(|| RelayError::Config(format!("missing required option {flag}")))
}

/// Resolve a merged config into settings. Port mapping errors surface here.
pub fn settings(config: RelayFileConfig) -> Result<RelaySettings, RelayError> {
    let ports = PortMap::try_from(config.ports.as_slice())?;
    Ok(RelaySettings {
        relay: required(config.relay, "--relay")?.to_ascii_lowercase(),
        username: required(config.username, "--username")?.to_ascii_lowercase(),
        api_key: required(config.api_key, "--api-key")?,
        host: config.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
        service: config.service.unwrap_or_else(|| DEFAULT_API_SUBDOMAIN.to_string()),
        ports,
        no_tls: config.no_tls,
        connect: config.connect,
        insecure: config.insecure,
        cert_dir: config.cert_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_DIR)),
        self_signed: config.self_signed,
        reconnect: config.reconnect,
        ping_interval: Duration::from_secs(config.ping_interval_secs),
        connect_timeout: Duration::from_secs(config.connect_timeout_secs),
    })
}

/// Run the relay with the given CLI arguments.
pub async fn run(args: RelayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.load()?;
    // Logs go to stderr unless `output = "stdout"`; the banner always goes to stdout.
    config.logging.init();

    if let Some(listen) = &config.metrics.listen {
        spacekit_metrics::init_prometheus(listen)?;
        info!(%listen, "metrics exporter listening");
    }

    let settings = settings(config)?;
    if settings.ports.is_empty() {
        warn!("no port mappings given (-p); every tunnel request will be refused");
    }
    info!(
        version = spacekit_core::VERSION,
        hostname = %settings.hostname(),
        service = %settings.service_hostname(),
        "spacekit relay starting"
    );

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        spacekit_core::signal::terminated(|signal, e| warn!(signal, error = %e, "cannot listen for signal")).await;
        info!("closing control channel");
        on_signal.cancel();
    });

    run_with_shutdown(settings, shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RelayArgs {
        RelayArgs::try_parse_from(std::iter::once("spacekit-relay").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn short_h_is_host() {
        let args = parse(&["-r", "web", "-u", "alice", "-a", "key", "-h", "example.org", "-p", "3000", "-p", "8080:8081"]);
        assert_eq!(args.host.as_deref(), Some("example.org"));
        assert_eq!(args.ports, vec!["3000", "8080:8081"]);
    }

    #[test]
    fn cli_overrides_file() {
        let args = parse(&["-r", "Web", "-u", "alice", "-a", "key", "--self-signed"]);
        let file = RelayFileConfig {
            relay: Some("other".into()),
            host: Some("example.org".into()),
            ports: vec!["3000".into()],
            ..RelayFileConfig::default()
        };
        let settings = settings(args.merge(file)).unwrap();
        assert_eq!(settings.hostname(), "web.alice.example.org");
        assert_eq!(settings.service_hostname(), "api.example.org");
        assert_eq!(settings.ports.len(), 1);
        assert!(settings.self_signed);
        assert_eq!(settings.cert_dir, PathBuf::from(DEFAULT_CERT_DIR));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let args = parse(&["-r", "web", "-u", "alice"]);
        let err = settings(args.merge(RelayFileConfig::default())).unwrap_err();
        assert!(err.to_string().contains("--api-key"), "{err}");
    }

    #[test]
    fn conflicting_ports_fail() {
        let args = parse(&["-r", "web", "-u", "alice", "-a", "key", "-p", "3000", "-p", "localhost:4000"]);
        let err = settings(args.merge(RelayFileConfig::default())).unwrap_err();
        assert!(matches!(err, RelayError::PortMap(_)), "{err}");
    }

    #[test]
    fn loads_file_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(
            &path,
            "relay = \"web\"\nusername = \"alice\"\napi_key = \"secret\"\nports = [\"3000\"]\n\n[reconnect]\ninitial_delay_ms = 500\n",
        )
        .unwrap();
        let args = parse(&["--config", path.to_str().unwrap()]);
        let settings = settings(args.load().unwrap()).unwrap();
        assert_eq!(settings.reconnect.initial_delay_ms, 500);
        assert_eq!(settings.hostname(), "web.alice.spacekit.io");
    }
}

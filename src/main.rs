//! Unified spacekit CLI.
//!
//! - `spacekit service` - run the public-facing service
//! - `spacekit relay` - expose local ports through a service
//! - `spacekit auth` - hash API keys for `auth.users`
//! - `spacekit cert` - generate self-signed certificates
//!
//! The service and relay are also built as standalone binaries.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "spacekit",
    version,
    about = "Expose local TLS endpoints under a public hostname",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the spacekit service.
    #[command(name = "service", alias = "serve")]
    Service(Box<spacekit_service::cli::ServiceArgs>),

    /// Run a relay.
    #[command(name = "relay")]
    Relay(Box<spacekit_relay::cli::RelayArgs>),

    /// API key utilities.
    #[command(name = "auth")]
    Auth(spacekit_auth::cli::AuthArgs),

    /// Certificate utilities.
    #[command(name = "cert")]
    Cert(spacekit_cert::CertArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Service(args) => spacekit_service::cli::run(*args).await,
        Commands::Relay(args) => spacekit_relay::cli::run(*args).await,
        Commands::Auth(args) => spacekit_auth::cli::run(args),
        Commands::Cert(args) => spacekit_cert::run(args).map_err(Into::into),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

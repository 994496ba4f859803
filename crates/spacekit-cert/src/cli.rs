//! `spacekit cert` command line.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "spacekit-cert", version, about = "Development certificates for spacekit")]
pub struct CertArgs {
    #[command(subcommand)]
    pub command: CertCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CertCommands {
    /// Write a self-signed certificate and key as PEM.
    Generate(GenerateArgs),
}

/// Where `generate` puts the PEM files.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    /// `<output>/<name>.pem` and `<output>/<name>-key.pem`, for the service's
    /// `tls.api` / `tls.web` entries.
    #[default]
    Pair,
    /// `<output>/<first domain>/fullchain.pem` and `privkey.pem`, the layout a
    /// relay's `--cert-dir` reads.
    Store,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// DNS name for the subject alternative names; repeat for more.
    #[arg(short, long = "domain", value_name = "NAME", required = true)]
    pub domains: Vec<String>,

    /// IP address for the subject alternative names; repeat for more.
    #[arg(long = "ip", value_name = "ADDR")]
    pub ips: Vec<IpAddr>,

    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = Layout::Pair)]
    pub layout: Layout,

    /// File stem for the `pair` layout.
    #[arg(long, default_value = "spacekit")]
    pub name: String,

    /// Days until expiry.
    #[arg(long, default_value_t = 90)]
    pub days: u32,
}

impl GenerateArgs {
    /// Certificate and key paths for the chosen layout.
    pub fn paths(&self) -> (PathBuf, PathBuf) {
        match self.layout {
            Layout::Pair => (
                self.output.join(format!("{}.pem", self.name)),
                self.output.join(format!("{}-key.pem", self.name)),
            ),
            Layout::Store => {
                let dir = self.store_dir();
                (dir.join(crate::issuer::FULLCHAIN_FILE), dir.join(crate::issuer::PRIVKEY_FILE))
            }
        }
    }

    fn store_dir(&self) -> PathBuf {
        match self.domains.first() {
            Some(host) => self.output.join(host.to_ascii_lowercase()),
            None => self.output.clone(),
        }
    }
}

pub(crate) fn parent(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new("."))
}

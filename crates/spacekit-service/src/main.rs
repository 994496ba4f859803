//! Standalone spacekit service binary.

use clap::Parser;
use spacekit_service::cli::{self, ServiceArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServiceArgs::parse();
    cli::run(args).await
}

use clap::Parser;
use spacekit_relay::cli::{RelayArgs, run};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run(RelayArgs::parse()).await
}

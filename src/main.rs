use anyhow::Context;
use procwatch::cli::Cli;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default filter, e.g. RUST_LOG=procwatch=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = Cli::run().await.context("procwatch failed") {
        eprintln!("✗ Error: {:#}", e);
        std::process::exit(1);
    }
}

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use doro_mobile_runtime::config::Args;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Geometry and link settings are fixed for the lifetime of the process
    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = doro_mobile_runtime::runtime::run(config).await {
        error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

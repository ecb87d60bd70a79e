//! SmartHealth server entry point

use clap::Parser;
use tracing_subscriber::EnvFilter;

use smarthealth_server::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    smarthealth_server::commands::execute(cli).await
}

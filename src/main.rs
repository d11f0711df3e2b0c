use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flatdex::application::{Cli, CommandExecutor};
use flatdex::shared::config::ConfigLoader;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::from_file(&cli.config).with_context(|| format!("failed to load {}", cli.config))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    CommandExecutor::execute(cli.command, config).await?;
    Ok(())
}

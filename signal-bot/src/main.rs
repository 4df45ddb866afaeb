use anyhow::{Context, Result};
use common::EngineConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod feed;
mod metrics;
mod runner;

use runner::Runner;

const DEFAULT_CONFIG: &str = "config/signal-bot.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Signal Decision Engine");

    let config_path = std::env::var("SIGNAL_BOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;
    info!(
        symbols = config.symbols.len(),
        fallback = config.email.is_some(),
        "configuration loaded"
    );

    let runner = Runner::build(config).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let summary = runner.run(shutdown).await?;
    info!(
        candles = summary.candles,
        news = summary.news,
        interrupted = summary.interrupted,
        "Signal Decision Engine stopped"
    );
    Ok(())
}

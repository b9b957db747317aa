mod affiliate;
mod comment;
mod config;
mod llm;
mod orchestrator;
mod poster;
mod server;
#[cfg(test)]
mod testing;
mod tools;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::orchestrator::CommentOrchestrator;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,affiliate_replier=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {} ({})", config.llm.model, config.llm.provider);
    info!("  Link search: {}", config.affiliate.base_url);
    info!("  Thread: {}", config.reddit.thread_url);
    info!("  Browser sessions: {}", config.browser.max_sessions);

    let orchestrator = CommentOrchestrator::from_config(&config)?;
    let state = AppState::new(orchestrator);

    server::run(state, config.server.port).await?;

    Ok(())
}

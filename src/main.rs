mod broadcast;
mod config;
mod platform;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,broadcastbot=debug".into()),
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
    info!("  Max recipients: {}", config.broadcast.max_recipients);
    info!("  Delay: {}s", config.broadcast.delay_seconds);
    if config.telegram.allowed_user_ids.is_empty() {
        info!("  Allowed users: everyone");
    } else {
        info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);
    }

    let bot = teloxide::Bot::new(&config.telegram.bot_token);

    info!("Bot started! Waiting for messages...");
    platform::telegram::run(bot, config).await?;

    Ok(())
}

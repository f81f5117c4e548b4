use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telebot::types::Update;
use telebot::{Bot, BotConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telebot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = BotConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Mode: {}", config.mode);
    info!("  API: {}", config.api_url);

    let mut bot = Bot::start(&config).await.context("Failed to start bot")?;

    let me = bot.api().get_me().await.context("getMe failed")?;
    info!(
        "Running as @{} ({})",
        me.username.as_deref().unwrap_or("?"),
        me.id
    );
    if let Some(addr) = bot.webhook_addr() {
        info!("Webhook endpoint: http://{}/", addr);
    }

    loop {
        let (updates, errors) = bot.channels();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            update = updates.recv() => match update {
                Some(update) => match update.parse::<Update>() {
                    Ok(typed) => {
                        let text = typed
                            .message
                            .as_ref()
                            .and_then(|m| m.text.as_deref())
                            .unwrap_or("<no text>");
                        info!("Update {}: {}", typed.update_id, text);
                    }
                    Err(e) => warn!("Update {:?} not understood: {}", update.update_id(), e),
                },
                None => {
                    warn!("Update channel closed");
                    break;
                }
            },
            Some(err) = errors.recv() => {
                warn!("Ingestion error: {}", err);
            }
        }
    }

    bot.shutdown().await;
    Ok(())
}

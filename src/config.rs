use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::{poll, webhook};
use crate::transport::DEFAULT_API_URL;

/// How updates reach the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionMode {
    /// Periodic `getUpdates`. Also accepted as `"local"`.
    Poll,
    Webhook,
}

impl FromStr for IngestionMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "poll" => Ok(IngestionMode::Poll),
            "webhook" => Ok(IngestionMode::Webhook),
            other => Err(crate::Error::Config(format!(
                "unknown ingestion mode '{}' (expected \"local\", \"poll\" or \"webhook\")",
                other
            ))),
        }
    }
}

impl std::fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestionMode::Poll => write!(f, "poll"),
            IngestionMode::Webhook => write!(f, "webhook"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub token: String,
    /// Kept as written; parsed when the bot starts.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,
    #[serde(default = "default_error_buffer")]
    pub error_buffer: usize,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Extra pause after a failed fetch.
    #[serde(default = "default_poll_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_host")]
    pub host: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
}

fn default_mode() -> String {
    "local".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_update_buffer() -> usize {
    64
}

fn default_error_buffer() -> usize {
    16
}

fn default_poll_interval_secs() -> u64 {
    poll::DEFAULT_INTERVAL.as_secs()
}

fn default_poll_cooldown_secs() -> u64 {
    poll::DEFAULT_COOLDOWN.as_secs()
}

fn default_webhook_host() -> String {
    webhook::DEFAULT_HOST.to_string()
}

fn default_webhook_port() -> u16 {
    webhook::DEFAULT_PORT
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            cooldown_secs: default_poll_cooldown_secs(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_webhook_host(),
            port: default_webhook_port(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl BotConfig {
    /// Defaults everywhere except the token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            mode: default_mode(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            update_buffer: default_update_buffer(),
            error_buffer: default_error_buffer(),
            poll: PollConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }

    pub fn ingestion_mode(&self) -> crate::Result<IngestionMode> {
        self.mode.parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: BotConfig = toml::from_str(content)?;
        if config.token.trim().is_empty() {
            anyhow::bail!("token must not be empty");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BotConfig::from_toml(r#"token = "123:abc""#).unwrap();

        assert_eq!(config.mode, "local");
        assert_eq!(config.ingestion_mode().unwrap(), IngestionMode::Poll);
        assert_eq!(config.api_url, "https://api.telegram.org");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.update_buffer, 64);
        assert_eq!(config.error_buffer, 16);
        assert_eq!(config.poll.interval(), Duration::from_secs(300));
        assert_eq!(config.poll.cooldown(), Duration::from_secs(60));
        assert_eq!(config.webhook.host, "0.0.0.0");
        assert_eq!(config.webhook.port, 8000);
    }

    #[test]
    fn test_full_config() {
        let config = BotConfig::from_toml(
            r#"
            token = "123:abc"
            mode = "webhook"
            api_url = "http://127.0.0.1:8081"
            request_timeout_secs = 3

            [poll]
            interval_secs = 5

            [webhook]
            host = "127.0.0.1"
            port = 8443
            "#,
        )
        .unwrap();

        assert_eq!(config.ingestion_mode().unwrap(), IngestionMode::Webhook);
        assert_eq!(config.api_url, "http://127.0.0.1:8081");
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.poll.interval_secs, 5);
        assert_eq!(config.poll.cooldown_secs, 60);
        assert_eq!(config.webhook.port, 8443);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("poll".parse::<IngestionMode>().unwrap(), IngestionMode::Poll);
        assert_eq!("Local".parse::<IngestionMode>().unwrap(), IngestionMode::Poll);
        assert_eq!(
            " webhook ".parse::<IngestionMode>().unwrap(),
            IngestionMode::Webhook
        );
        assert!(matches!(
            "carrier-pigeon".parse::<IngestionMode>(),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_mode_loads_but_fails_to_parse() {
        let config = BotConfig::from_toml("token = \"1:x\"\nmode = \"smtp\"").unwrap();
        assert!(config.ingestion_mode().is_err());
    }

    #[test]
    fn test_missing_or_empty_token_rejected() {
        assert!(BotConfig::from_toml("mode = \"poll\"").is_err());
        assert!(BotConfig::from_toml("token = \"  \"").is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = BotConfig::load(Path::new("/nonexistent/telebot.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

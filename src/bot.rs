use std::net::SocketAddr;

use tokio::sync::mpsc;
use tracing::info;

use crate::api::Api;
use crate::config::{BotConfig, IngestionMode};
use crate::error::{Error, Result};
use crate::ingest::poll::Poller;
use crate::ingest::webhook::WebhookListener;
use crate::ingest::{Ingestion, RawUpdate, UpdateSource};
use crate::transport::Transport;

/// A running client: the operation catalog plus the ingestion task feeding
/// the update and error channels.
///
/// Dropping the `Bot` cancels ingestion; [`Bot::shutdown`] also waits for it.
#[derive(Debug)]
pub struct Bot {
    api: Api,
    mode: IngestionMode,
    webhook_addr: Option<SocketAddr>,
    updates: mpsc::Receiver<RawUpdate>,
    errors: mpsc::Receiver<Error>,
    ingestion: Ingestion,
}

impl Bot {
    /// Validate the configuration, build the client and start ingestion.
    ///
    /// Config and bind errors are returned here, before anything runs in the
    /// background.
    pub async fn start(config: &BotConfig) -> Result<Self> {
        let mode = config.ingestion_mode()?;
        if config.token.trim().is_empty() {
            return Err(Error::Config("token must not be empty".to_string()));
        }
        if config.update_buffer == 0 || config.error_buffer == 0 {
            return Err(Error::Config(
                "update_buffer and error_buffer must be at least 1".to_string(),
            ));
        }

        let transport = Transport::new(&config.token, &config.api_url, config.request_timeout())?;

        let mut webhook_addr = None;
        let source: Box<dyn UpdateSource> = match mode {
            IngestionMode::Poll => Box::new(Poller::new(
                transport.clone(),
                config.poll.interval(),
                config.poll.cooldown(),
            )),
            IngestionMode::Webhook => {
                let listener =
                    WebhookListener::bind(&config.webhook.host, config.webhook.port).await?;
                webhook_addr = Some(listener.local_addr());
                Box::new(listener)
            }
        };

        let (update_tx, updates) = mpsc::channel(config.update_buffer);
        let (error_tx, errors) = mpsc::channel(config.error_buffer);
        let ingestion = Ingestion::spawn(source, update_tx, error_tx);

        info!("Bot started in {} mode against {}", mode, config.api_url);
        Ok(Self {
            api: Api::new(transport),
            mode,
            webhook_addr,
            updates,
            errors,
            ingestion,
        })
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn mode(&self) -> IngestionMode {
        self.mode
    }

    /// Where the webhook listener is bound, in webhook mode.
    pub fn webhook_addr(&self) -> Option<SocketAddr> {
        self.webhook_addr
    }

    pub fn updates(&mut self) -> &mut mpsc::Receiver<RawUpdate> {
        &mut self.updates
    }

    pub fn errors(&mut self) -> &mut mpsc::Receiver<Error> {
        &mut self.errors
    }

    /// Both receivers at once, for `tokio::select!` over the two channels.
    pub fn channels(&mut self) -> (&mut mpsc::Receiver<RawUpdate>, &mut mpsc::Receiver<Error>) {
        (&mut self.updates, &mut self.errors)
    }

    pub fn is_ingesting(&self) -> bool {
        !self.ingestion.is_finished()
    }

    /// Stop ingestion and wait for it. Updates still buffered are discarded.
    pub async fn shutdown(self) {
        info!("Shutting down {} ingestion", self.mode);
        self.ingestion.shutdown().await;
    }
}

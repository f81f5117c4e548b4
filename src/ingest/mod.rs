//! Update ingestion: one background task feeding an update channel and an
//! error channel.
//!
//! The source is either a polling loop ([`poll::Poller`]) or an inbound
//! webhook listener ([`webhook::WebhookListener`]). Both only ever see a
//! [`Sinks`], which owns the channel senders and the cancellation token.

pub mod poll;
pub mod webhook;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// One inbound update, kept as the JSON the server sent.
///
/// The consumer picks the shape: [`RawUpdate::parse`] into
/// [`crate::types::Update`] or any type of its own, or [`RawUpdate::value`]
/// for untyped access.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpdate {
    update_id: Option<i64>,
    raw: Bytes,
}

impl RawUpdate {
    /// Accepts a JSON object; anything else is a decode error.
    pub fn from_bytes(raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        let value: Value = serde_json::from_slice(&raw).map_err(Error::Decode)?;
        Self::check(&value)?;
        Ok(Self {
            update_id: value.get("update_id").and_then(Value::as_i64),
            raw,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Self::check(value)?;
        let raw = serde_json::to_vec(value).map_err(Error::Encode)?;
        Ok(Self {
            update_id: value.get("update_id").and_then(Value::as_i64),
            raw: raw.into(),
        })
    }

    fn check(value: &Value) -> Result<()> {
        if value.is_object() {
            Ok(())
        } else {
            Err(Error::Validation(
                "an update must be a JSON object".to_string(),
            ))
        }
    }

    pub fn update_id(&self) -> Option<i64> {
        self.update_id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.raw).map_err(Error::Decode)
    }

    pub fn value(&self) -> Result<Value> {
        self.parse()
    }
}

/// Producer side of the two channels, shared by every source.
#[derive(Debug, Clone)]
pub struct Sinks {
    updates: mpsc::Sender<RawUpdate>,
    errors: mpsc::Sender<Error>,
    cancel: CancellationToken,
}

impl Sinks {
    pub fn new(
        updates: mpsc::Sender<RawUpdate>,
        errors: mpsc::Sender<Error>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            updates,
            errors,
            cancel,
        }
    }

    /// Waits for room on the update channel. Returns `false` once the
    /// receiver is gone or ingestion was cancelled; the update is dropped.
    pub async fn deliver(&self, update: RawUpdate) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.updates.send(update) => sent.is_ok(),
        }
    }

    /// Never blocks. A full (or closed) error channel loses the error.
    pub fn report(&self, err: Error) {
        if let Err(e) = self.errors.try_send(err) {
            match e {
                mpsc::error::TrySendError::Full(err) => {
                    warn!("Error channel full, dropping: {}", err)
                }
                mpsc::error::TrySendError::Closed(err) => {
                    warn!("Error channel closed, dropping: {}", err)
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.updates.is_closed()
    }

    pub fn cancelled(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// A way of obtaining updates. Runs until cancelled or until the update
/// receiver is dropped.
#[async_trait]
pub trait UpdateSource: Send + 'static {
    fn mode(&self) -> &'static str;

    async fn run(self: Box<Self>, sinks: Sinks);
}

/// Handle on the running ingestion task. Dropping it cancels the task.
#[derive(Debug)]
pub struct Ingestion {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Ingestion {
    pub fn spawn(
        source: Box<dyn UpdateSource>,
        updates: mpsc::Sender<RawUpdate>,
        errors: mpsc::Sender<Error>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let sinks = Sinks::new(updates, errors, cancel.clone());
        let mode = source.mode();

        info!("Starting {} ingestion", mode);
        let handle = tokio::spawn(async move {
            source.run(sinks).await;
            info!("{} ingestion stopped", mode);
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel and wait for the task to wind down.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Ingestion task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Ingestion {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//! Telegram Bot API client.
//!
//! [`Api`] exposes the remote operations as typed async methods. [`Bot`]
//! bundles an `Api` with a background ingestion task that delivers updates,
//! either by polling `getUpdates` or through an inbound webhook, over an
//! update channel and an out-of-band error channel.

pub mod api;
pub mod bot;
pub mod config;
pub mod envelope;
pub mod error;
pub mod ingest;
pub mod multipart;
pub mod requests;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use api::{Api, Posted};
pub use bot::Bot;
pub use config::{BotConfig, IngestionMode};
pub use error::{Error, Rejection, Result};
pub use ingest::RawUpdate;
pub use multipart::InputFile;
pub use transport::Transport;

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::{RawUpdate, Sinks, UpdateSource};
use crate::error::{Error, Result};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Inbound webhook: the server POSTs one update per request to `/`.
///
/// The socket is bound by [`WebhookListener::bind`], so a port conflict is
/// reported to whoever builds the listener rather than from the background
/// task.
pub struct WebhookListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl WebhookListener {
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| Error::Config(format!("can't resolve webhook host '{}': {}", host, e)))?
            .next()
            .ok_or_else(|| Error::Config(format!("webhook host '{}' has no address", host)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let addr = listener.local_addr()?;

        info!("Webhook listening on {}", addr);
        Ok(Self { listener, addr })
    }

    /// The bound address; differs from the requested one when port 0 was used.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

fn router(sinks: Sinks) -> Router {
    Router::new().route("/", post(receive)).with_state(sinks)
}

async fn receive(State(sinks): State<Sinks>, body: Bytes) -> StatusCode {
    let update = match RawUpdate::from_bytes(body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Rejecting webhook body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!("Webhook update {:?}", update.update_id());
    if sinks.deliver(update).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[async_trait]
impl UpdateSource for WebhookListener {
    fn mode(&self) -> &'static str {
        "webhook"
    }

    async fn run(self: Box<Self>, sinks: Sinks) {
        let WebhookListener { listener, addr } = *self;
        let cancel = sinks.cancelled().clone();
        let app = router(sinks);

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
        {
            error!("Webhook server on {} failed: {}", addr, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Ingestion;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    async fn start() -> (
        Ingestion,
        SocketAddr,
        mpsc::Receiver<RawUpdate>,
        mpsc::Receiver<Error>,
    ) {
        let listener = WebhookListener::bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr();
        let (update_tx, update_rx) = mpsc::channel(4);
        let (error_tx, error_rx) = mpsc::channel(4);
        let ingestion = Ingestion::spawn(Box::new(listener), update_tx, error_tx);
        (ingestion, addr, update_rx, error_rx)
    }

    #[tokio::test]
    async fn test_post_delivers_one_update() {
        let (ingestion, addr, mut updates, _errors) = start().await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/", addr))
            .json(&json!({"update_id": 501, "message": {"text": "ping"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let update = timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.update_id(), Some(501));
        assert_eq!(update.value().unwrap()["message"]["text"], "ping");
        assert!(updates.try_recv().is_err());

        ingestion.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejects_non_object_body() {
        let (ingestion, addr, mut updates, _errors) = start().await;
        let client = reqwest::Client::new();

        for body in ["not json", "[1,2,3]"] {
            let response = client
                .post(format!("http://{}/", addr))
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        }
        assert!(updates.try_recv().is_err());

        ingestion.shutdown().await;
    }

    #[tokio::test]
    async fn test_only_post_on_root() {
        let (ingestion, addr, _updates, _errors) = start().await;
        let client = reqwest::Client::new();

        let get = client.get(format!("http://{}/", addr)).send().await.unwrap();
        assert_eq!(get.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

        let other = client
            .post(format!("http://{}/hook", addr))
            .json(&json!({"update_id": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(other.status(), reqwest::StatusCode::NOT_FOUND);

        ingestion.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        match WebhookListener::bind("127.0.0.1", port).await {
            Err(Error::Bind { addr, .. }) => assert_eq!(addr.port(), port),
            other => panic!("expected bind error, got {:?}", other.map(|l| l.local_addr())),
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_listener() {
        let (ingestion, addr, _updates, _errors) = start().await;
        timeout(Duration::from_secs(2), ingestion.shutdown())
            .await
            .expect("graceful shutdown");

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}

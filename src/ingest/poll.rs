use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{RawUpdate, Sinks, UpdateSource};
use crate::envelope;
use crate::error::Result;
use crate::transport::{method, Transport};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Periodic `getUpdates` loop.
///
/// Each cycle waits `interval`, fetches, and delivers every update in order.
/// A batch element that isn't a JSON object is reported and skipped; the rest
/// of the batch still goes out. A 4xx status skips the cycle. Any other failure goes to the error channel
/// followed by an extra `cooldown` pause.
pub struct Poller {
    transport: Transport,
    interval: Duration,
    cooldown: Duration,
    offset: Option<i64>,
}

impl Poller {
    pub fn new(transport: Transport, interval: Duration, cooldown: Duration) -> Self {
        Self {
            transport,
            interval,
            cooldown,
            offset: None,
        }
    }

    /// Next `offset` sent to the server, once anything was received.
    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    async fn fetch(&self) -> Result<Vec<Value>> {
        let body = match self.offset {
            Some(offset) => {
                self.transport
                    .get_with_query(method::GET_UPDATES, &[("offset", offset)])
                    .await?
            }
            None => self.transport.get(method::GET_UPDATES).await?,
        };

        envelope::decode(method::GET_UPDATES, &body)
    }

    /// Move the offset past every `update_id` in the batch, delivered or not.
    fn advance(&mut self, batch: &[Value]) {
        let highest = batch
            .iter()
            .filter_map(|value| value.get("update_id").and_then(Value::as_i64))
            .max();
        if let Some(last) = highest {
            let next = last + 1;
            if self.offset.map_or(true, |current| next > current) {
                self.offset = Some(next);
            }
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(sinks: &Sinks, duration: Duration) -> bool {
        tokio::select! {
            _ = sinks.cancelled().cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[async_trait]
impl UpdateSource for Poller {
    fn mode(&self) -> &'static str {
        "poll"
    }

    async fn run(self: Box<Self>, sinks: Sinks) {
        let mut poller = *self;
        info!(
            "Polling every {:?} (cooldown {:?})",
            poller.interval, poller.cooldown
        );

        loop {
            if !Self::pause(&sinks, poller.interval).await {
                return;
            }
            if sinks.is_closed() {
                info!("Update receiver dropped, stopping poller");
                return;
            }

            let fetched = tokio::select! {
                _ = sinks.cancelled().cancelled() => return,
                fetched = poller.fetch() => fetched,
            };

            match fetched {
                Ok(batch) => {
                    debug!("Fetched {} update(s)", batch.len());
                    poller.advance(&batch);
                    for value in &batch {
                        match RawUpdate::from_value(value) {
                            Ok(update) => {
                                if !sinks.deliver(update).await {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!("Skipping malformed update: {}", e);
                                sinks.report(e);
                            }
                        }
                    }
                }
                Err(e) if e.is_client_status() => {
                    warn!("getUpdates refused, skipping cycle: {}", e);
                }
                Err(e) => {
                    warn!("getUpdates failed, cooling down: {}", e);
                    sinks.report(e);
                    if !Self::pause(&sinks, poller.cooldown).await {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ingest::Ingestion;
    use crate::testing::{unreachable_url, MockResponse, MockServer};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn poller(base: &str, interval_ms: u64, cooldown_ms: u64) -> Box<Poller> {
        let transport = Transport::new("1:t", base, Duration::from_secs(2)).unwrap();
        Box::new(Poller::new(
            transport,
            Duration::from_millis(interval_ms),
            Duration::from_millis(cooldown_ms),
        ))
    }

    async fn wait_for_requests(server: &MockServer, count: usize) {
        timeout(Duration::from_secs(5), async {
            while server.request_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("poller kept requesting");
    }

    #[test]
    fn test_advance_tracks_highest_id() {
        let mut p = Poller::new(
            Transport::new("1:t", "http://localhost", Duration::from_secs(1)).unwrap(),
            DEFAULT_INTERVAL,
            DEFAULT_COOLDOWN,
        );
        assert_eq!(p.offset(), None);

        let batch = vec![
            json!({"update_id": 10}),
            json!({"update_id": 12}),
            json!({"no_id": true}),
            json!(42),
        ];
        p.advance(&batch);
        assert_eq!(p.offset(), Some(13));

        p.advance(&[json!({"update_id": 4})]);
        assert_eq!(p.offset(), Some(13));
        p.advance(&[]);
        assert_eq!(p.offset(), Some(13));
    }

    #[tokio::test]
    async fn test_client_error_skips_cycle_without_reporting() {
        let server = MockServer::start(vec![
            MockResponse::status(400, "{\"ok\":false}"),
            MockResponse::ok(json!([{"update_id": 7, "message": {"text": "hello"}}])),
            MockResponse::ok(json!([])),
        ])
        .await;
        let (update_tx, mut update_rx) = mpsc::channel(8);
        let (error_tx, mut error_rx) = mpsc::channel(8);
        let ingestion = Ingestion::spawn(poller(&server.url(), 20, 1000), update_tx, error_tx);

        let update = timeout(Duration::from_secs(5), update_rx.recv())
            .await
            .expect("update delivered")
            .expect("channel open");
        assert_eq!(update.update_id(), Some(7));
        assert_eq!(update.value().unwrap()["message"]["text"], "hello");

        wait_for_requests(&server, 4).await;
        assert!(update_rx.try_recv().is_err());
        assert!(error_rx.try_recv().is_err());
        assert!(!ingestion.is_finished());

        let requests = server.requests();
        assert!(requests.len() >= 3);
        assert_eq!(requests[0].path, "/bot1:t/getUpdates");
        assert_eq!(requests[0].query, None);
        assert_eq!(requests[2].query.as_deref(), Some("offset=8"));

        ingestion.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_element_does_not_sink_batch() {
        let server = MockServer::start(vec![
            MockResponse::ok(json!([{"update_id": 7}, 42])),
            MockResponse::ok(json!([])),
        ])
        .await;
        let (update_tx, mut update_rx) = mpsc::channel(8);
        let (error_tx, mut error_rx) = mpsc::channel(8);
        let ingestion = Ingestion::spawn(poller(&server.url(), 10, 10), update_tx, error_tx);

        let update = timeout(Duration::from_secs(5), update_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.update_id(), Some(7));

        let err = timeout(Duration::from_secs(5), error_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, Error::Validation(_)));

        wait_for_requests(&server, 3).await;
        let requests = server.requests();
        assert_eq!(requests[0].query, None);
        assert_eq!(requests[1].query.as_deref(), Some("offset=8"));
        assert!(update_rx.try_recv().is_err());
        assert!(error_rx.try_recv().is_err());

        ingestion.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_updates_pass_through() {
        let server = MockServer::start(vec![
            MockResponse::ok(json!([{"update_id": 7}, {"update_id": 7}])),
            MockResponse::ok(json!([])),
        ])
        .await;
        let (update_tx, mut update_rx) = mpsc::channel(8);
        let (error_tx, mut error_rx) = mpsc::channel(8);
        let ingestion = Ingestion::spawn(poller(&server.url(), 10, 10), update_tx, error_tx);

        for _ in 0..2 {
            let update = timeout(Duration::from_secs(5), update_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(update.update_id(), Some(7));
        }

        wait_for_requests(&server, 3).await;
        assert!(update_rx.try_recv().is_err());
        assert!(error_rx.try_recv().is_err());

        ingestion.shutdown().await;
    }

    #[tokio::test]
    async fn test_network_failure_reports_and_cools_down() {
        let (update_tx, mut update_rx) = mpsc::channel(8);
        let (error_tx, mut error_rx) = mpsc::channel(8);
        let ingestion = Ingestion::spawn(
            poller(&unreachable_url().await, 10, 50),
            update_tx,
            error_tx,
        );

        let first = timeout(Duration::from_secs(5), error_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let started = tokio::time::Instant::now();
        let second = timeout(Duration::from_secs(5), error_rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(first, Error::Http(_)));
        assert!(matches!(second, Error::Http(_)));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(update_rx.try_recv().is_err());
        assert!(!ingestion.is_finished());

        ingestion.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_envelope_is_reported() {
        let server = MockServer::start(vec![MockResponse::rejected(
            409,
            "Conflict: can't use getUpdates method while webhook is active",
        )])
        .await;
        let (update_tx, _update_rx) = mpsc::channel(8);
        let (error_tx, mut error_rx) = mpsc::channel(8);
        let ingestion = Ingestion::spawn(poller(&server.url(), 10, 1000), update_tx, error_tx);

        let err = timeout(Duration::from_secs(5), error_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(err.rejection().and_then(|r| r.error_code), Some(409));

        ingestion.shutdown().await;
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let server = MockServer::start(vec![MockResponse::ok(json!([]))]).await;
        let (update_tx, update_rx) = mpsc::channel(8);
        let (error_tx, _error_rx) = mpsc::channel(8);
        let ingestion = Ingestion::spawn(poller(&server.url(), 10, 10), update_tx, error_tx);

        drop(update_rx);
        timeout(Duration::from_secs(2), async {
            while !ingestion.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("poller should stop on its own");
    }
}

//! Persistent streaming broker (NATS JetStream) with a durable,
//! explicit-ack consumer.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};
use crate::message::{Message, Stats};
use crate::provider::{Provider, Subscription};

const MAX_DELIVER: i64 = 3;
const ACK_WAIT: Duration = Duration::from_secs(30);
const BATCH_SIZE: usize = 10;
const NO_MESSAGE_BACKOFF: Duration = Duration::from_millis(100);
const TRANSIENT_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const MAX_MESSAGES: i64 = 1_000_000;
const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct StreamingConfig {
    pub url: String,
    pub stream_name: String,
    pub subject_prefix: String,
    /// Not part of the factory's flat config table (which lists only
    /// `streaming_url`); the wire format in 4.3 requires a topic to
    /// address `<prefix>.<topic>`, so this is recognized as an
    /// additional key the factory accepts beyond the literal table
    /// (see DESIGN.md).
    pub topic: String,
    pub max_reconnects: usize,
    pub reconnect_wait: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream_name: "MESSAGES".to_string(),
            subject_prefix: "messages".to_string(),
            topic: "default".to_string(),
            max_reconnects: 10,
            reconnect_wait: Duration::from_secs(2),
        }
    }
}

pub struct StreamingProvider {
    jetstream: jetstream::Context,
    stream: Mutex<jetstream::stream::Stream>,
    config: StreamingConfig,
    subject: String,
    client: async_nats::Client,
    published: AtomicI64,
    delivered: Arc<AtomicI64>,
    closed: AtomicBool,
}

impl StreamingProvider {
    pub async fn connect(config: StreamingConfig) -> Result<Self> {
        let opts = async_nats::ConnectOptions::new()
            .max_reconnects(config.max_reconnects)
            .connection_timeout(config.reconnect_wait);

        let client = opts
            .connect(&config.url)
            .await
            .map_err(|e| ProviderError::BackendUnavailable(format!("{}: {e}", config.url)))?;

        tracing::info!(url = %config.url, "connected to streaming broker");

        let jetstream = jetstream::new(client.clone());
        let stream = ensure_stream(&jetstream, &config).await?;
        let subject = format!("{}.{}", config.subject_prefix, config.topic);

        Ok(Self {
            jetstream,
            stream: Mutex::new(stream),
            subject,
            client,
            config,
            published: AtomicI64::new(0),
            delivered: Arc::new(AtomicI64::new(0)),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Provider for StreamingProvider {
    async fn publish(&self, _scope: &CancellationToken, message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        let payload = message.to_wire()?;
        let ack = self
            .jetstream
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| ProviderError::BackendUnavailable(format!("publish to {}: {e}", self.subject)))?
            .await
            .map_err(|e| ProviderError::BackendUnavailable(format!("ack failed for {}: {e}", self.subject)))?;

        tracing::debug!(subject = %self.subject, sequence = ack.sequence, "message published");
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, scope: CancellationToken) -> Result<Box<dyn Subscription>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        let consumer_name = format!("{}-consumer", self.config.topic);
        let consumer = self
            .stream
            .lock()
            .await
            .get_or_create_consumer(
                &consumer_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(consumer_name.clone()),
                    filter_subject: self.subject.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    max_deliver: MAX_DELIVER,
                    ack_wait: ACK_WAIT,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ProviderError::BackendUnavailable(format!("create consumer {consumer_name}: {e}")))?;

        let (tx, rx) = mpsc::channel(BATCH_SIZE);
        let delivered = Arc::clone(&self.delivered);
        tokio::spawn(pull_loop(consumer, tx, scope, delivered));

        Ok(Box::new(StreamingSubscription { rx }))
    }

    async fn stats(&self) -> Stats {
        Stats {
            published: self.published.load(Ordering::SeqCst),
            delivered: self.delivered.load(Ordering::SeqCst),
            current_size: Stats::UNKNOWN_SIZE,
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        self.client
            .drain()
            .await
            .map_err(|e| ProviderError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }
}

struct StreamingSubscription {
    rx: mpsc::Receiver<Message>,
}

#[async_trait]
impl Subscription for StreamingSubscription {
    async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

/// Owns the JetStream pull consumer iterator for the lifetime of one
/// subscription. Deserialize failures are nak'd and skipped. A message
/// is positively acked only after the downstream channel accepts it; if
/// the scope cancels mid hand-off, the pull loop exits without acking
/// and the broker redelivers after `ack-wait`.
async fn pull_loop(
    consumer: jetstream::consumer::PullConsumer,
    tx: mpsc::Sender<Message>,
    scope: CancellationToken,
    delivered: Arc<AtomicI64>,
) {
    loop {
        if scope.is_cancelled() {
            return;
        }

        let batch = consumer
            .batch()
            .max_messages(BATCH_SIZE)
            .expires(ACK_WAIT)
            .messages()
            .await;

        let mut batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "pull batch failed, backing off");
                tokio::select! {
                    _ = scope.cancelled() => return,
                    _ = tokio::time::sleep(TRANSIENT_ERROR_BACKOFF) => {}
                }
                continue;
            }
        };

        use futures::StreamExt;
        let mut saw_message = false;
        loop {
            let next = tokio::select! {
                _ = scope.cancelled() => return,
                next = batch.next() => next,
            };
            let Some(next) = next else { break };

            let msg = match next {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "error pulling message, backing off");
                    tokio::select! {
                        _ = scope.cancelled() => return,
                        _ = tokio::time::sleep(TRANSIENT_ERROR_BACKOFF) => {}
                    }
                    continue;
                }
            };
            saw_message = true;

            let parsed = Message::from_wire(&msg.payload);
            let parsed = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to deserialize message, nak'ing");
                    let _ = msg.ack_with(jetstream::AckKind::Nak(None)).await;
                    continue;
                }
            };

            tokio::select! {
                _ = scope.cancelled() => return,
                send_result = tx.send(parsed) => {
                    if send_result.is_err() {
                        return;
                    }
                    if msg.ack().await.is_err() {
                        tracing::warn!("failed to ack message after hand-off");
                    }
                    delivered.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        if !saw_message {
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = tokio::time::sleep(NO_MESSAGE_BACKOFF) => {}
            }
        }
    }
}

async fn ensure_stream(
    js: &jetstream::Context,
    config: &StreamingConfig,
) -> Result<jetstream::stream::Stream> {
    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: vec![format!("{}.*", config.subject_prefix)],
        storage: jetstream::stream::StorageType::File,
        retention: jetstream::stream::RetentionPolicy::WorkQueue,
        max_messages: MAX_MESSAGES,
        max_age: MAX_AGE,
        ..Default::default()
    };

    // `get_or_create_stream` is idempotent: a racing creator that loses
    // the race simply gets the already-created stream back, so there is
    // no sentinel-string "already exists" check to make here.
    let stream = js
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| ProviderError::BackendUnavailable(format!("stream {}: {e}", config.stream_name)))?;

    tracing::info!(stream = %config.stream_name, "streaming broker stream ready");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// These tests need a real JetStream broker and are not mocked, so
    /// they print a notice and return early when none is reachable
    /// rather than failing the suite in environments without NATS.
    async fn try_provider(topic_suffix: &str) -> Option<StreamingProvider> {
        let config = StreamingConfig {
            stream_name: format!("TRANSIT_TEST_{topic_suffix}"),
            topic: format!("test-{topic_suffix}"),
            max_reconnects: 0,
            ..Default::default()
        };
        match StreamingProvider::connect(config).await {
            Ok(provider) => Some(provider),
            Err(e) => {
                eprintln!("skipping streaming test: no broker reachable ({e})");
                None
            }
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_round_trip() {
        let Some(provider) = try_provider("roundtrip").await else {
            return;
        };
        let scope = CancellationToken::new();
        let msg = Message::new("s-1", "test", b"payload".to_vec());
        provider.publish(&scope, msg.clone()).await.unwrap();

        let mut sub = provider.subscribe(scope.clone()).await.unwrap();
        let delivered = tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("message should arrive within 5s");
        assert_eq!(delivered.unwrap().id, msg.id);
        provider.close().await.unwrap();
    }
}

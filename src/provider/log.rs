//! Partitioned log broker (Kafka-compatible) with idempotent producer
//! and consumer-group semantics.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message as _, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};
use crate::message::{Message, Stats};
use crate::provider::{Provider, Subscription};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const BUFFER_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub consumer_group: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["127.0.0.1:9092".to_string()],
            topic: "messages".to_string(),
            consumer_group: "transit-worker-pool".to_string(),
        }
    }
}

/// Backed by a partitioned, replicated log with consumer-group
/// semantics. Delivery is at-least-once with strong per-partition
/// order; `Stats.current_size` is not directly measurable and is
/// always reported as `-1` (see spec's open question: 0 would wrongly
/// read as "empty").
pub struct LogProvider {
    producer: FutureProducer,
    config: LogConfig,
    published: AtomicI64,
    delivered: Arc<AtomicI64>,
    closed: AtomicBool,
}

impl LogProvider {
    pub fn connect(config: LogConfig) -> Result<Self> {
        let brokers = config.brokers.join(",");
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("message.send.max.retries", "5")
            .set("max.in.flight.requests.per.connection", "1")
            .set("compression.type", "snappy")
            .set("socket.timeout.ms", "10000")
            .set("message.timeout.ms", "10000")
            .create()
            .map_err(|e| ProviderError::BackendUnavailable(format!("create producer: {e}")))?;

        tracing::info!(brokers = %brokers, topic = %config.topic, "connected to log broker");

        Ok(Self {
            producer,
            config,
            published: AtomicI64::new(0),
            delivered: Arc::new(AtomicI64::new(0)),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Provider for LogProvider {
    async fn publish(&self, _scope: &CancellationToken, message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        let payload = message.to_wire()?;
        let headers = OwnedHeaders::new()
            .insert(rdkafka::message::Header {
                key: "source",
                value: Some(message.source.as_str()),
            })
            .insert(rdkafka::message::Header {
                key: "message_id",
                value: Some(message.id.as_str()),
            });

        let record = FutureRecord::to(&self.config.topic)
            .payload(&payload)
            .key(&message.id)
            .headers(headers);

        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok((partition, offset)) => {
                tracing::debug!(topic = %self.config.topic, partition, offset, "message published");
                self.published.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err((e, _)) => Err(ProviderError::BackendUnavailable(format!(
                "publish to {}: {e}",
                self.config.topic
            ))),
        }
    }

    async fn subscribe(&self, scope: CancellationToken) -> Result<Box<dyn Subscription>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        let brokers = self.config.brokers.join(",");
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &self.config.consumer_group)
            .set("partition.assignment.strategy", "roundrobin")
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "20000")
            .set("heartbeat.interval.ms", "6000")
            .set("max.poll.interval.ms", "60000")
            .set("fetch.message.max.bytes", "1048576")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| ProviderError::BackendUnavailable(format!("create consumer: {e}")))?;

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| ProviderError::BackendUnavailable(format!("subscribe to {}: {e}", self.config.topic)))?;

        tracing::info!(
            topic = %self.config.topic,
            consumer_group = %self.config.consumer_group,
            "joined consumer group"
        );

        let (tx, rx) = mpsc::channel(BUFFER_SIZE);
        let delivered = Arc::clone(&self.delivered);
        tokio::spawn(consume_loop(consumer, tx, scope, delivered));

        Ok(Box::new(LogSubscription { rx }))
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
        Ok(())
    }
}

struct LogSubscription {
    rx: mpsc::Receiver<Message>,
}

#[async_trait]
impl Subscription for LogSubscription {
    async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

/// Owns the consumer for one subscription. A record that fails to
/// deserialize is stored (skipped) and not forwarded. A successfully
/// forwarded record's offset is stored for commit only after the
/// downstream channel accepts it; the periodic auto-commit then
/// persists whatever offsets have been stored. If the hand-off never
/// completes (rebalance, shutdown), the offset is never stored and the
/// record is redelivered to whichever consumer picks up the partition.
async fn consume_loop(
    consumer: StreamConsumer,
    tx: mpsc::Sender<Message>,
    scope: CancellationToken,
    delivered: Arc<AtomicI64>,
) {
    use futures::StreamExt;
    let mut stream = consumer.stream();

    loop {
        let next = tokio::select! {
            _ = scope.cancelled() => break,
            next = stream.next() => next,
        };
        let Some(next) = next else { break };

        let owned = match next {
            Ok(borrowed) => borrowed.detach(),
            Err(e) => {
                tracing::warn!(error = %e, "error reading from log broker");
                continue;
            }
        };

        let Some(payload) = owned.payload() else {
            tracing::warn!("record with no payload, skipping");
            let _ = consumer.store_offset_from_message(&owned);
            continue;
        };

        let parsed = match Message::from_wire(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "failed to deserialize record, skipping");
                let _ = consumer.store_offset_from_message(&owned);
                continue;
            }
        };

        tokio::select! {
            _ = scope.cancelled() => break,
            send_result = tx.send(parsed) => {
                if send_result.is_err() {
                    break;
                }
                if let Err(e) = consumer.store_offset_from_message(&owned) {
                    tracing::warn!(error = %e, "failed to store offset after hand-off");
                }
                delivered.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    let _ = consumer.commit_consumer_state(CommitMode::Async);
    tracing::debug!("log consumer task exiting");
}

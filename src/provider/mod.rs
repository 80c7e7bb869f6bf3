//! Provider trait — the core abstraction for message transports.
//!
//! Every backend (in-memory, NATS JetStream, Kafka, fan-out composite)
//! implements `Provider` so that callers get a uniform
//! publish/subscribe/stats/close surface regardless of which transport
//! is underneath.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::{Message, Stats};

pub mod composite;
pub mod log;
pub mod memory;
pub mod streaming;

/// Core trait every message-transport backend implements.
///
/// Implementations must be safe under concurrent callers and must not
/// retain an alias to a caller's `Message` past `publish` returning.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Deliver one message. Must be safe under concurrent callers.
    async fn publish(&self, scope: &CancellationToken, message: Message) -> Result<()>;

    /// Return a lazy sequence of messages bound to `scope`. Cancelling
    /// `scope` terminates the stream within a bounded grace period. At
    /// most one active subscription per provider instance is required.
    async fn subscribe(&self, scope: CancellationToken) -> Result<Box<dyn Subscription>>;

    /// Point-in-time snapshot of this provider's counters.
    async fn stats(&self) -> Stats;

    /// Idempotent: release all resources and terminate in-flight
    /// subscribe streams cleanly. Subsequent calls return `ClosedError`.
    async fn close(&self) -> Result<()>;
}

/// A finite lazy sequence of delivered messages with an explicit end of
/// stream, observed by the consumer as `next()` returning `None`.
///
/// Deliberately has no error channel: mid-stream faults (deserialization
/// failures, transient backend errors) are handled internally by the
/// provider and either recovered or turned into stream termination.
#[async_trait]
pub trait Subscription: Send + Sync {
    async fn next(&mut self) -> Option<Message>;
}

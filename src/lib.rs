//! # transit
//!
//! A pluggable message-transport layer with uniform producer/consumer
//! semantics across several backends, composed with a concurrent
//! worker-pool processor that drains that transport at scale.
//!
//! ## Quick Start
//!
//! ```rust
//! use transit::{Message, WorkerPool};
//! use transit::provider::memory::MemoryProvider;
//! use transit::provider::Provider;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> transit::Result<()> {
//! let provider = Arc::new(MemoryProvider::new(16));
//! let scope = CancellationToken::new();
//! provider.publish(&scope, Message::new("evt-1", "api", b"hello".to_vec())).await?;
//!
//! let pool = WorkerPool::new(2, provider)?;
//! pool.start(scope.clone()).await?;
//! if let Some(result) = pool.recv_result().await {
//!     println!("processed {}: success={}", result.message_id, result.success);
//! }
//! scope.cancel();
//! pool.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **memory** — bounded in-process queue with non-blocking publish
//! - **streaming** — NATS JetStream, durable consumer, explicit ack
//! - **log** — Kafka-compatible partitioned log, consumer groups
//! - **composite** — fan-out to N providers under a selectable policy
//!
//! ## Architecture
//!
//! - **Provider** trait — publish/subscribe/stats/close, implemented by
//!   every backend
//! - **Subscription** trait — the lazy finite message stream a
//!   subscribe call returns
//! - **WorkerPool** — N concurrent workers draining one subscription
//! - **ProviderFactory** — builds a provider tree from a config record

pub mod error;
pub mod factory;
pub mod message;
pub mod provider;
pub mod worker_pool;

pub use error::{ProviderError, Result};
pub use factory::{ProviderConfig, ProviderFactory};
pub use message::{Message, ProcessingErrorKind, ProcessingResult, Stats};
pub use provider::{Provider, Subscription};
pub use worker_pool::{PoolStats, WorkerPool};

//! Constructs a provider tree from a flat configuration record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::provider::composite::{CompositeProvider, CompositeStrategy};
use crate::provider::log::{LogConfig, LogProvider};
use crate::provider::memory::MemoryProvider;
use crate::provider::streaming::{StreamingConfig, StreamingProvider};
use crate::provider::Provider;

/// Flat configuration record. `queue_type` and `composite_strategy` are
/// plain strings rather than enums so that an unrecognized value can be
/// reported as `UnsupportedTypeError` by the factory rather than
/// rejected earlier, opaquely, by deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    pub queue_type: String,
    pub queue_size: Option<usize>,
    pub streaming_url: Option<String>,
    /// Not in the literal config option table — unknown keys are
    /// ignored, implying the table is illustrative, not exhaustive, and
    /// a streaming provider needs a topic to build `<prefix>.<topic>`.
    /// See DESIGN.md.
    pub streaming_topic: Option<String>,
    pub log_brokers: Option<Vec<String>>,
    pub log_topic: Option<String>,
    pub log_consumer_group: Option<String>,
    pub composite_providers: Option<Vec<ProviderConfig>>,
    pub composite_strategy: Option<String>,
    pub worker_count: Option<usize>,
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub async fn build(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        match config.queue_type.as_str() {
            "composite" => {
                let children_config = config.composite_providers.clone().ok_or_else(|| {
                    ProviderError::Config("composite_providers is required for a composite provider".into())
                })?;
                let mut children = Vec::with_capacity(children_config.len());
                for child_config in &children_config {
                    children.push(Self::build_leaf(child_config).await?);
                }
                let strategy = match config.composite_strategy.as_deref() {
                    Some("fail-fast") => CompositeStrategy::FailFast,
                    Some("best-effort") => CompositeStrategy::BestEffort,
                    Some(other) => return Err(ProviderError::UnsupportedType(format!("composite strategy '{other}'"))),
                    None => {
                        return Err(ProviderError::Config(
                            "composite_strategy is required for a composite provider".into(),
                        ))
                    }
                };
                Ok(Arc::new(CompositeProvider::new(children, strategy)?))
            }
            _ => Self::build_leaf(config).await,
        }
    }

    /// Builds anything except a composite. Composite children may not
    /// themselves be composites (recursion depth 1), so a "composite"
    /// `queue_type` reaching here is rejected.
    async fn build_leaf(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        match config.queue_type.as_str() {
            "memory" => {
                let size = config
                    .queue_size
                    .ok_or_else(|| ProviderError::Config("queue_size is required for a memory provider".into()))?;
                Ok(Arc::new(MemoryProvider::new(size)))
            }
            "streaming" => {
                let url = config
                    .streaming_url
                    .clone()
                    .ok_or_else(|| ProviderError::Config("streaming_url is required for a streaming provider".into()))?;
                let mut streaming_config = StreamingConfig {
                    url,
                    ..StreamingConfig::default()
                };
                if let Some(topic) = &config.streaming_topic {
                    streaming_config.topic = topic.clone();
                }
                Ok(Arc::new(StreamingProvider::connect(streaming_config).await?))
            }
            "log" => {
                let brokers = config
                    .log_brokers
                    .clone()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| ProviderError::Config("log_brokers is required for a log provider".into()))?;
                let topic = config
                    .log_topic
                    .clone()
                    .ok_or_else(|| ProviderError::Config("log_topic is required for a log provider".into()))?;
                let consumer_group = config
                    .log_consumer_group
                    .clone()
                    .ok_or_else(|| ProviderError::Config("log_consumer_group is required for a log provider".into()))?;
                Ok(Arc::new(LogProvider::connect(LogConfig {
                    brokers,
                    topic,
                    consumer_group,
                })?))
            }
            "composite" => Err(ProviderError::UnsupportedType(
                "nested composite providers are not supported".into(),
            )),
            other => Err(ProviderError::UnsupportedType(format!("queue_type '{other}'"))),
        }
    }
}

//! Error taxonomy shared across every provider.

use thiserror::Error;

/// Named failure modes a `Provider` or the `ProviderFactory` can produce.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-blocking publish rejected because the buffer is at capacity.
    /// The caller may retry.
    #[error("queue is full")]
    QueueFull,

    /// Operation attempted on a closed, or never-opened, provider.
    #[error("provider is closed")]
    Closed,

    /// Network or broker failure. Producer-side retryable; subscribe loops
    /// back off and retry internally rather than surfacing this.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Payload could not be encoded or decoded. Fatal for the single
    /// message involved, not for the provider.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker did not acknowledge a publish within the configured
    /// window.
    #[error("ack timed out after {0:?}")]
    AckTimeout(std::time::Duration),

    /// A `CompositeProvider` was constructed with an empty child list.
    #[error("composite provider has no children configured")]
    NoProvidersConfigured,

    /// The factory was given an unrecognized `queue_type` or
    /// `composite_strategy`.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Required configuration is missing for the selected provider type.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

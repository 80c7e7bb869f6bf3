//! Wire-neutral data types passed between providers and the worker pool.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProviderError;

/// A single event message. `id` and `payload` must survive publish -> deliver
/// bit-exact; providers must not retain an alias to the caller's copy past
/// `publish` returning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub timestamp: i64,
    pub source: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn new(id: impl Into<String>, source: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            timestamp: now_secs(),
            source: source.into(),
            payload: payload.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn to_wire(&self) -> Result<Vec<u8>, ProviderError> {
        serde_json::to_vec(self).map_err(ProviderError::from)
    }

    pub(crate) fn from_wire(bytes: &[u8]) -> Result<Self, ProviderError> {
        serde_json::from_slice(bytes).map_err(ProviderError::from)
    }
}

/// The error kinds a `ProcessingResult` may echo back for a failed message.
/// A narrow subset of `ProviderError` that can meaningfully describe a
/// per-message processing failure rather than a provider-level fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingErrorKind {
    Serialization,
    Other,
}

/// What a worker produced for one input message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub message_id: String,
    pub processed_at: i64,
    pub success: bool,
    #[serde(with = "base64_bytes")]
    pub result: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProcessingErrorKind>,
}

/// Point-in-time provider counters. `current_size` is `-1` when the
/// provider cannot cheaply measure in-flight count (e.g. `LogProvider`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub published: i64,
    pub delivered: i64,
    pub current_size: i64,
}

impl Stats {
    pub const UNKNOWN_SIZE: i64 = -1;
}

pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

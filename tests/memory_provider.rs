//! S1 (round-trip) and S2 (overflow) from the memory provider's
//! testable-properties scenarios.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use transit::provider::memory::MemoryProvider;
use transit::provider::Provider;
use transit::{Message, ProviderError};

#[tokio::test]
async fn s1_memory_round_trip() {
    let provider = MemoryProvider::new(10);
    let scope = CancellationToken::new();

    let mut metadata = HashMap::new();
    metadata.insert("k".to_string(), "v".to_string());
    let message = Message {
        id: "a".to_string(),
        timestamp: 1_700_000_000,
        source: "t".to_string(),
        payload: b"hi".to_vec(),
        metadata,
    };

    provider.publish(&scope, message.clone()).await.unwrap();
    assert_eq!(provider.stats().await.published, 1);

    let mut sub = provider.subscribe(scope.clone()).await.unwrap();
    let delivered = sub.next().await.expect("expected one delivered message");
    assert_eq!(delivered, message);

    let stats = provider.stats().await;
    assert_eq!(stats.published, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.current_size, 0);
}

#[tokio::test]
async fn s2_memory_overflow() {
    let provider = MemoryProvider::new(1);
    let scope = CancellationToken::new();

    provider
        .publish(&scope, Message::new("1", "t", Vec::new()))
        .await
        .unwrap();

    let err = provider
        .publish(&scope, Message::new("2", "t", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::QueueFull));
    assert_eq!(provider.stats().await.current_size, 1);
}

//! LogProvider publish/subscribe round trip. Requires a reachable
//! Kafka-compatible broker; skips when none is available rather than
//! mocking the wire protocol.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use transit::provider::log::{LogConfig, LogProvider};
use transit::provider::Provider;
use transit::Message;

fn try_provider(suffix: &str) -> Option<LogProvider> {
    let config = LogConfig {
        brokers: vec!["127.0.0.1:9092".to_string()],
        topic: format!("transit-test-{suffix}"),
        consumer_group: format!("transit-test-group-{suffix}"),
    };
    match LogProvider::connect(config) {
        Ok(provider) => Some(provider),
        Err(e) => {
            eprintln!("skipping log_provider test: no broker reachable ({e})");
            None
        }
    }
}

#[tokio::test]
async fn publish_and_subscribe_round_trip() {
    let Some(provider) = try_provider("roundtrip") else {
        return;
    };
    let scope = CancellationToken::new();
    let message = Message::new("log-1", "test", b"payload".to_vec());
    provider.publish(&scope, message.clone()).await.unwrap();

    let mut sub = provider.subscribe(scope.clone()).await.unwrap();
    let delivered = tokio::time::timeout(Duration::from_secs(10), sub.next())
        .await
        .expect("message should arrive within 10s");
    assert_eq!(delivered.unwrap().id, message.id);

    scope.cancel();
    provider.close().await.unwrap();
}

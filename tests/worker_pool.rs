//! S5: WorkerPool with 2 workers over memory, fed 10 messages.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use transit::provider::memory::MemoryProvider;
use transit::provider::Provider;
use transit::{Message, WorkerPool};

#[tokio::test]
async fn s5_worker_pool_with_two_workers_over_memory() {
    let provider = Arc::new(MemoryProvider::new(20));
    let scope = CancellationToken::new();

    let published: Vec<String> = (0..10).map(|i| format!("m-{i}")).collect();
    for id in &published {
        provider
            .publish(&scope, Message::new(id.clone(), "t", Vec::new()))
            .await
            .unwrap();
    }

    let pool = WorkerPool::new(2, provider).unwrap();
    pool.start(scope.clone()).await.unwrap();

    let mut received = HashSet::new();
    for _ in 0..10 {
        let result = pool.recv_result().await.expect("result should arrive");
        assert!(result.success);
        received.insert(result.message_id);
    }

    assert_eq!(received, published.into_iter().collect());
    assert_eq!(pool.stats().processed_count, 10);
    assert_eq!(pool.stats().error_count, 0);

    scope.cancel();
    pool.stop().await.unwrap();
}

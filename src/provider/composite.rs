//! Fan-out publish to N providers under a selectable failure policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};
use crate::message::{Message, Stats};
use crate::provider::{Provider, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeStrategy {
    /// Publish in parallel to all children; if any child fails, return
    /// the first error. Successful children's effects are not rolled
    /// back.
    FailFast,
    /// Publish in parallel; log each failure; return success unless
    /// every child failed.
    ///
    /// All-children-failed is treated as an error rather than success: a
    /// composite publish that landed on zero children is a materially
    /// different outcome than one that landed on at least one, and
    /// callers need to be able to tell the two apart.
    BestEffort,
}

/// Wraps a non-empty ordered list of child providers with a policy.
pub struct CompositeProvider {
    children: Vec<Arc<dyn Provider>>,
    strategy: CompositeStrategy,
    closed: AtomicBool,
}

impl CompositeProvider {
    pub fn new(children: Vec<Arc<dyn Provider>>, strategy: CompositeStrategy) -> Result<Self> {
        if children.is_empty() {
            return Err(ProviderError::NoProvidersConfigured);
        }
        Ok(Self {
            children,
            strategy,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Provider for CompositeProvider {
    async fn publish(&self, scope: &CancellationToken, message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }

        let futures = self.children.iter().map(|child| {
            let message = message.clone();
            let child = Arc::clone(child);
            async move { child.publish(scope, message).await }
        });
        let results = futures::future::join_all(futures).await;

        match self.strategy {
            CompositeStrategy::FailFast => {
                for result in results {
                    result?;
                }
                Ok(())
            }
            CompositeStrategy::BestEffort => {
                let mut last_error = None;
                let mut any_succeeded = false;
                for result in results {
                    match result {
                        Ok(()) => any_succeeded = true,
                        Err(e) => {
                            tracing::warn!(error = %e, "composite child publish failed");
                            last_error = Some(e);
                        }
                    }
                }
                if any_succeeded {
                    Ok(())
                } else {
                    Err(last_error.unwrap_or(ProviderError::NoProvidersConfigured))
                }
            }
        }
    }

    async fn subscribe(&self, scope: CancellationToken) -> Result<Box<dyn Subscription>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        // Deliberate simplification: composite is a write-side fan-out,
        // not a read-side merger. Subscribing returns the first child's
        // stream only.
        self.children[0].subscribe(scope).await
    }

    async fn stats(&self) -> Stats {
        let snapshots = futures::future::join_all(self.children.iter().map(|c| c.stats())).await;
        let mut published = 0;
        let mut delivered = 0;
        let mut current_size = 0;
        for snapshot in &snapshots {
            published += snapshot.published;
            delivered += snapshot.delivered;
            if snapshot.current_size != Stats::UNKNOWN_SIZE {
                current_size += snapshot.current_size;
            }
        }
        Stats {
            published,
            delivered,
            current_size,
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        let mut first_error = None;
        for child in &self.children {
            if let Err(e) = child.close().await {
                tracing::warn!(error = %e, "composite child close failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryProvider;

    struct AlwaysFails;

    #[async_trait]
    impl Provider for AlwaysFails {
        async fn publish(&self, _scope: &CancellationToken, _message: Message) -> Result<()> {
            Err(ProviderError::BackendUnavailable("mock failure".to_string()))
        }
        async fn subscribe(&self, scope: CancellationToken) -> Result<Box<dyn Subscription>> {
            MemoryProvider::new(1).subscribe(scope).await
        }
        async fn stats(&self) -> Stats {
            Stats {
                published: 0,
                delivered: 0,
                current_size: 0,
            }
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fail_fast_returns_first_error_but_still_reaches_good_children() {
        let memory = Arc::new(MemoryProvider::new(10));
        let composite = CompositeProvider::new(
            vec![memory.clone(), Arc::new(AlwaysFails)],
            CompositeStrategy::FailFast,
        )
        .unwrap();

        let scope = CancellationToken::new();
        let err = composite
            .publish(&scope, Message::new("1", "t", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::BackendUnavailable(_)));
        assert_eq!(memory.stats().await.published, 1);
    }

    #[tokio::test]
    async fn best_effort_succeeds_when_one_child_accepts() {
        let memory = Arc::new(MemoryProvider::new(10));
        let composite = CompositeProvider::new(
            vec![memory.clone(), Arc::new(AlwaysFails)],
            CompositeStrategy::BestEffort,
        )
        .unwrap();

        let scope = CancellationToken::new();
        composite
            .publish(&scope, Message::new("1", "t", Vec::new()))
            .await
            .unwrap();
        assert_eq!(memory.stats().await.published, 1);
    }

    #[tokio::test]
    async fn best_effort_fails_when_every_child_fails() {
        let composite = CompositeProvider::new(
            vec![Arc::new(AlwaysFails), Arc::new(AlwaysFails)],
            CompositeStrategy::BestEffort,
        )
        .unwrap();

        let scope = CancellationToken::new();
        assert!(composite
            .publish(&scope, Message::new("1", "t", Vec::new()))
            .await
            .is_err());
    }

    #[test]
    fn empty_children_is_rejected_at_construction() {
        let err = CompositeProvider::new(Vec::new(), CompositeStrategy::FailFast).unwrap_err();
        assert!(matches!(err, ProviderError::NoProvidersConfigured));
    }
}

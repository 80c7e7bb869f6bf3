//! Bounded in-process queue with non-blocking publish.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};
use crate::message::{Message, Stats};
use crate::provider::{Provider, Subscription};

struct State {
    capacity: usize,
    queue: Mutex<VecDeque<Message>>,
    notify: Notify,
    closed: AtomicBool,
    published: AtomicI64,
    delivered: AtomicI64,
}

/// A bounded FIFO buffer of capacity `N`. `publish` never blocks: it
/// either enqueues immediately or fails with `QueueFull`.
pub struct MemoryProvider {
    state: Arc<State>,
}

impl MemoryProvider {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(State {
                capacity,
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                published: AtomicI64::new(0),
                delivered: AtomicI64::new(0),
            }),
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn publish(&self, scope: &CancellationToken, message: Message) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        let mut queue = self.state.queue.lock().await;
        if queue.len() < self.state.capacity {
            queue.push_back(message);
            drop(queue);
            self.state.published.fetch_add(1, Ordering::SeqCst);
            self.state.notify.notify_one();
            return Ok(());
        }
        drop(queue);
        if scope.is_cancelled() {
            Err(ProviderError::Closed)
        } else {
            Err(ProviderError::QueueFull)
        }
    }

    async fn subscribe(&self, scope: CancellationToken) -> Result<Box<dyn Subscription>> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        Ok(Box::new(MemorySubscription {
            state: self.state.clone(),
            scope,
        }))
    }

    async fn stats(&self) -> Stats {
        let current_size = self.state.queue.lock().await.len() as i64;
        Stats {
            published: self.state.published.load(Ordering::SeqCst),
            delivered: self.state.delivered.load(Ordering::SeqCst),
            current_size,
        }
    }

    async fn close(&self) -> Result<()> {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        self.state.notify.notify_waiters();
        Ok(())
    }
}

struct MemorySubscription {
    state: Arc<State>,
    scope: CancellationToken,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Option<Message> {
        loop {
            if self.scope.is_cancelled() {
                return None;
            }
            {
                let mut queue = self.state.queue.lock().await;
                if let Some(message) = queue.pop_front() {
                    drop(queue);
                    self.state.delivered.fetch_add(1, Ordering::SeqCst);
                    return Some(message);
                }
            }
            if self.state.closed.load(Ordering::SeqCst) {
                return None;
            }
            tokio::select! {
                _ = self.scope.cancelled() => return None,
                _ = self.state.notify.notified() => {}
            }
        }
    }
}

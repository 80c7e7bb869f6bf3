//! A fixed-size set of concurrent workers draining a single
//! subscription stream.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};
use crate::message::{Message, ProcessingResult};
use crate::provider::Provider;

const RESULT_CHANNEL_FACTOR: usize = 2;

/// A point-in-time view of worker-pool counters, read-guarded for
/// consistency across the three fields. Counters are strictly
/// monotonic until `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub processed_count: u64,
    pub error_count: u64,
    pub total_duration: Duration,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    errors: AtomicU64,
    total_duration_nanos: AtomicI64,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            processed_count: self.processed.load(Ordering::SeqCst),
            error_count: self.errors.load(Ordering::SeqCst),
            total_duration: Duration::from_nanos(self.total_duration_nanos.load(Ordering::SeqCst) as u64),
        }
    }
}

struct Running {
    handles: Vec<JoinHandle<()>>,
    rx: mpsc::Receiver<ProcessingResult>,
    scope: CancellationToken,
}

/// Concurrent consumer that drives a single subscriber. Construct with
/// `new`, call `start` once to begin draining, read results with
/// `recv_result`, and call `stop` to shut down cleanly.
pub struct WorkerPool {
    n_workers: usize,
    subscriber: Arc<dyn Provider>,
    counters: Arc<Counters>,
    running: Mutex<Option<Running>>,
}

impl WorkerPool {
    pub fn new(n_workers: usize, subscriber: Arc<dyn Provider>) -> Result<Self> {
        if n_workers == 0 {
            return Err(ProviderError::Config("n_workers must be at least 1".into()));
        }
        Ok(Self {
            n_workers,
            subscriber,
            counters: Arc::new(Counters::default()),
            running: Mutex::new(None),
        })
    }

    /// Subscribes once and launches `n_workers` concurrent workers
    /// sharing that stream. Failure to subscribe propagates.
    pub async fn start(&self, scope: CancellationToken) -> Result<()> {
        let mut guard = self.running.lock().await;
        if guard.is_some() {
            return Err(ProviderError::Config("worker pool already started".into()));
        }

        let input = self.subscriber.subscribe(scope.clone()).await?;
        let input = Arc::new(Mutex::new(input));
        let (tx, rx) = mpsc::channel(self.n_workers * RESULT_CHANNEL_FACTOR);

        let mut handles = Vec::with_capacity(self.n_workers);
        for _ in 0..self.n_workers {
            let input = Arc::clone(&input);
            let tx = tx.clone();
            let scope = scope.clone();
            let counters = Arc::clone(&self.counters);
            handles.push(tokio::spawn(worker_loop(input, tx, scope, counters)));
        }
        drop(tx);

        *guard = Some(Running { handles, rx, scope });
        Ok(())
    }

    /// Reads the next processed result. Consumers must drain this in a
    /// loop (or drop the pool) or workers block on the bounded result
    /// channel.
    pub async fn recv_result(&self) -> Option<ProcessingResult> {
        let mut guard = self.running.lock().await;
        let running = guard.as_mut()?;
        running.rx.recv().await
    }

    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Waits for all workers to exit, drains any remaining results so a
    /// worker blocked on a full result channel can unblock and exit,
    /// then closes the channel. Idempotent: a second call, or a call
    /// when the pool was never started, is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.running.lock().await;
        let Some(running) = guard.take() else {
            return Ok(());
        };
        running.scope.cancel();

        let Running { handles, mut rx, .. } = running;
        let drain = async {
            while rx.recv().await.is_some() {}
        };
        let join = futures::future::join_all(handles);
        tokio::join!(drain, join);
        Ok(())
    }
}

async fn worker_loop(
    input: Arc<Mutex<Box<dyn crate::provider::Subscription>>>,
    tx: mpsc::Sender<ProcessingResult>,
    scope: CancellationToken,
    counters: Arc<Counters>,
) {
    loop {
        let message = {
            let mut guard = input.lock().await;
            tokio::select! {
                _ = scope.cancelled() => None,
                next = guard.next() => next,
            }
        };
        let Some(message) = message else {
            return;
        };

        let started = Instant::now();
        let result = process(message);
        let elapsed = started.elapsed();
        counters.total_duration_nanos.fetch_add(elapsed.as_nanos() as i64, Ordering::SeqCst);
        if result.success {
            counters.processed.fetch_add(1, Ordering::SeqCst);
        } else {
            counters.errors.fetch_add(1, Ordering::SeqCst);
        }

        tokio::select! {
            _ = scope.cancelled() => return,
            send_result = tx.send(result) => {
                if send_result.is_err() {
                    return;
                }
            }
        }
    }
}

/// Pure function of the message: prepends a constant tag to the
/// payload and marks `success=true`. A production consumer of this
/// crate replaces this with domain logic; the pool contract around it
/// is unchanged.
fn process(message: Message) -> ProcessingResult {
    const TAG: &[u8] = b"processed:";
    let mut result = Vec::with_capacity(TAG.len() + message.payload.len());
    result.extend_from_slice(TAG);
    result.extend_from_slice(&message.payload);

    ProcessingResult {
        message_id: message.id,
        processed_at: crate::message::now_secs(),
        success: true,
        result,
        error_kind: None,
    }
}

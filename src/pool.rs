//! Bounded executor for handler invocations.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::QueueError;

/// Bounded pool for concurrent handler execution.
///
/// Free permits are the backpressure signal: the processor claims at most
/// [`HandlerPool::available_capacity`] messages per tick, so nothing is
/// claimed that cannot immediately run.
pub struct HandlerPool {
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
    running: AtomicBool,
    total_processed: Arc<AtomicU64>,
}

impl HandlerPool {
    /// Create a new pool.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            running: AtomicBool::new(false),
            total_processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the pool.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!(max_concurrency = self.max_concurrency, "handler pool started");
        }
    }

    /// Stop the pool. In-flight tasks run to completion; new submissions
    /// are rejected.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("handler pool stopped");
        }
    }

    /// Whether the pool accepts submissions.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Configured concurrency limit.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// How many additional tasks the pool can accept right now.
    pub fn available_capacity(&self) -> usize {
        if !self.is_running() {
            return 0;
        }
        self.semaphore.available_permits()
    }

    /// Total tasks run to completion.
    pub fn total_processed(&self) -> u64 {
        self.total_processed.load(Ordering::SeqCst)
    }

    /// Reserve one unit of capacity without waiting.
    ///
    /// Fails with [`QueueError::ExecutorRejected`] when the pool is stopped
    /// or all permits are taken, which can happen in the window between a
    /// capacity check and submission.
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, QueueError> {
        if !self.is_running() {
            return Err(QueueError::ExecutorRejected);
        }
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| QueueError::ExecutorRejected)
    }

    /// Run a task under a previously reserved permit.
    pub fn execute<F>(&self, permit: OwnedSemaphorePermit, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let total_processed = self.total_processed.clone();
        tokio::spawn(async move {
            task.await;
            total_processed.fetch_add(1, Ordering::SeqCst);
            drop(permit);
        })
    }
}

//! The durable queue contract.
//!
//! A [`Queue`] is the possibly fleet-shared backing store for messages.
//! Claim, ack and reschedule must be atomic with respect to each other so
//! that a message claimed by one poller stays invisible to all others until
//! it is acked, explicitly rescheduled, or its ack timeout elapses. Timeout
//! enforcement is owned by the backend's own clock, not by the processor.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::QueueError;
use crate::message::Message;

/// Predicate over messages, for caller-side idempotency guards.
pub type MessagePredicate<'a> = &'a (dyn Fn(&Message) -> bool + Send + Sync);

/// Queue depth counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueState {
    /// Entries waiting to be claimed, whether or not their delay elapsed.
    pub depth: u64,
    /// Entries past their delay and claimable right now.
    pub ready: u64,
    /// Claimed entries awaiting an ack.
    pub unacked: u64,
}

impl QueueState {
    /// Total entries the queue is still responsible for delivering.
    pub fn outstanding(&self) -> u64 {
        self.depth + self.unacked
    }
}

type AckFuture = Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send>>;

/// Single-use acknowledgement for a claimed message.
///
/// Invoking [`Ack::ack`] permanently removes the message from the queue.
/// Dropping the token without acking leaves the claim in place, so the
/// backend redelivers the message once its ack timeout elapses.
pub struct Ack {
    inner: Option<Box<dyn FnOnce() -> AckFuture + Send>>,
}

impl Ack {
    /// Wrap a backend-specific removal action.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), QueueError>> + Send + 'static,
    {
        Self {
            inner: Some(Box::new(move || Box::pin(f()) as AckFuture)),
        }
    }

    /// Acknowledge the message, removing it from the queue.
    pub async fn ack(mut self) -> Result<(), QueueError> {
        match self.inner.take() {
            Some(f) => f().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ack")
            .field("pending", &self.inner.is_some())
            .finish()
    }
}

/// A claimed message together with its acknowledgement token.
#[derive(Debug)]
pub struct Delivery {
    /// The claimed message.
    pub message: Message,
    /// Single-use ack for this claim.
    pub ack: Ack,
}

/// The durable work queue contract.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Default claim-to-presumed-lost duration. Individual messages may
    /// override it via [`Message::ack_timeout_ms`].
    fn ack_timeout(&self) -> Duration;

    /// Whether the backend can atomically claim more than one message per
    /// call. When `false`, callers must issue one single-item poll per
    /// desired claim.
    fn can_poll_many(&self) -> bool {
        false
    }

    /// Unconditionally enqueue a message, visible after `delay`.
    async fn push(&self, message: Message, delay: Duration) -> Result<(), QueueError>;

    /// Enqueue a message only if no logically-equivalent entry is already
    /// pending, ready or claimed; otherwise a no-op.
    async fn ensure(&self, message: Message, delay: Duration) -> Result<(), QueueError>;

    /// Atomically claim one ready message, if any.
    async fn poll(&self) -> Result<Option<Delivery>, QueueError>;

    /// Atomically claim up to `max` ready messages.
    ///
    /// The default implementation issues sequential single-item polls;
    /// backends with a native multi-claim override it and report
    /// [`Queue::can_poll_many`] accordingly.
    async fn poll_many(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let mut deliveries = Vec::new();
        while deliveries.len() < max {
            match self.poll().await? {
                Some(delivery) => deliveries.push(delivery),
                None => break,
            }
        }
        Ok(deliveries)
    }

    /// Move a claimed or ready message back to pending with a new delay,
    /// without touching its ack-attempt counter.
    async fn reschedule(&self, message: &Message, delay: Duration) -> Result<(), QueueError>;

    /// Whether any pending, ready or claimed message satisfies `predicate`.
    async fn contains_message(&self, predicate: MessagePredicate<'_>)
        -> Result<bool, QueueError>;

    /// Current depth counters.
    async fn read_state(&self) -> Result<QueueState, QueueError>;
}

/// Sink for messages the backend or processor has given up on.
///
/// Invoked once per terminal message; implementations must tolerate
/// at-least-once invocation and must not fail back into the caller.
#[async_trait]
pub trait DeadMessageHandler: Send + Sync {
    /// Receive a quarantined message.
    async fn handle(&self, queue: &dyn Queue, message: &Message);
}

/// External gate controlling whether processing may proceed.
///
/// All registered activators must report enabled for a tick to run; this is
/// how maintenance mode and externally supplied leader election plug in.
pub trait Activator: Send + Sync {
    /// Whether processing is currently allowed.
    fn enabled(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_ack_runs_wrapped_action_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let ack = Ack::new(move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        ack.ack().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropping_ack_does_nothing() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        {
            let _ack = Ack::new(move || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_queue_state_outstanding() {
        let state = QueueState {
            depth: 3,
            ready: 2,
            unacked: 1,
        };
        assert_eq!(state.outstanding(), 4);
    }
}

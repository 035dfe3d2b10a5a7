//! Disabled queue variant.
//!
//! Used when queueing is administratively disabled. Every capability
//! degrades to an observable, logged no-op rather than an error.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::message::Message;
use crate::queue::{Delivery, MessagePredicate, Queue, QueueState};

/// A [`Queue`] that accepts nothing and delivers nothing.
#[derive(Debug, Default)]
pub struct NoopQueue;

impl NoopQueue {
    /// Create a disabled queue.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Queue for NoopQueue {
    fn ack_timeout(&self) -> Duration {
        // Never consulted; a fixed nominal value.
        Duration::from_secs(1)
    }

    async fn push(&self, message: Message, _delay: Duration) -> Result<(), QueueError> {
        // A push to a disabled queue usually means misconfiguration, not intent.
        warn!(
            message_id = %message.id,
            kind = %message.kind,
            "message pushed to disabled queue, dropping"
        );
        Ok(())
    }

    async fn ensure(&self, message: Message, _delay: Duration) -> Result<(), QueueError> {
        debug!(kind = %message.kind, "ensure on disabled queue, ignoring");
        Ok(())
    }

    async fn poll(&self) -> Result<Option<Delivery>, QueueError> {
        Ok(None)
    }

    async fn reschedule(&self, message: &Message, _delay: Duration) -> Result<(), QueueError> {
        debug!(message_id = %message.id, "reschedule on disabled queue, ignoring");
        Ok(())
    }

    async fn contains_message(
        &self,
        _predicate: MessagePredicate<'_>,
    ) -> Result<bool, QueueError> {
        Ok(false)
    }

    async fn read_state(&self) -> Result<QueueState, QueueError> {
        Ok(QueueState {
            depth: 0,
            ready: 0,
            unacked: 0,
        })
    }
}

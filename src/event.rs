//! Observability events emitted by the processing core.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Signals published during message processing.
///
/// These are fire-and-forget notifications; consumers must never fail back
/// into the processor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A tick found zero free executor capacity, so nothing was claimed.
    NoHandlerCapacity,

    /// A handler invocation failed; the message was left unacked and will
    /// redeliver once its ack timeout elapses.
    HandlerError {
        message_id: Uuid,
        kind: String,
        error: String,
    },

    /// A message had no matching handler and was quarantined.
    MessageDead { message_id: Uuid, kind: String },

    /// The executor refused a submission and the message was pushed back
    /// with a jittered delay.
    MessageRescheduled {
        message_id: Uuid,
        kind: String,
        delay_ms: u64,
    },

    /// A handler completed and the message was acked.
    MessageProcessed { message_id: Uuid, kind: String },
}

/// Event consumer.
pub trait EventListener: Send + Sync {
    /// Called once per published event.
    fn on_event(&self, event: &QueueEvent);
}

/// Fans events out to registered listeners.
#[derive(Clone, Default)]
pub struct EventPublisher {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventPublisher {
    /// Create a publisher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn register(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Publish an event to all listeners.
    pub fn publish(&self, event: QueueEvent) {
        debug!(?event, "queue event");
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

//! In-memory queue backend.
//!
//! Backs tests and single-process configurations that do not need durable
//! persistence. Claims are atomic under one lock, so the backend reports
//! [`Queue::can_poll_many`] and serves whole batches per poll. Ack-timeout
//! sweeping runs lazily at the start of every poll, on the backend's own
//! clock, and uses [`tokio::time::Instant`] so paused-clock tests can drive
//! redelivery deterministically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MemoryQueueConfig;
use crate::error::QueueError;
use crate::message::Message;
use crate::queue::{Ack, DeadMessageHandler, Delivery, MessagePredicate, Queue, QueueState};

#[derive(Debug, Clone, Copy)]
enum EntryState {
    /// Enqueued; claimable once `deliver_at` passes.
    Queued { deliver_at: Instant },
    /// Held by a poller until acked, rescheduled, or `deadline` passes.
    Claimed { deadline: Instant },
}

struct Entry {
    message: Message,
    state: EntryState,
}

/// In-memory [`Queue`] implementation.
pub struct InMemoryQueue {
    config: MemoryQueueConfig,
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
    dead_handlers: Vec<Arc<dyn DeadMessageHandler>>,
}

impl InMemoryQueue {
    /// Create a queue with the given configuration.
    pub fn new(config: MemoryQueueConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
            dead_handlers: Vec::new(),
        }
    }

    /// Attach sinks invoked when a message exhausts its redelivery budget.
    pub fn with_dead_message_handlers(
        mut self,
        handlers: Vec<Arc<dyn DeadMessageHandler>>,
    ) -> Self {
        self.dead_handlers = handlers;
        self
    }

    /// Revert expired claims to ready, incrementing their ack-attempt
    /// counters, and cull entries past the redelivery budget. Returns the
    /// culled messages so callers can hand them to the dead-message sinks
    /// outside the lock.
    fn sweep(&self, entries: &mut HashMap<Uuid, Entry>, now: Instant) -> Vec<Message> {
        let mut exhausted = Vec::new();

        for (id, entry) in entries.iter_mut() {
            if let EntryState::Claimed { deadline } = entry.state {
                if deadline <= now {
                    entry.message.increment_ack_attempts();
                    entry.state = EntryState::Queued { deliver_at: now };
                    debug!(
                        message_id = %entry.message.id,
                        ack_attempts = entry.message.ack_attempts(),
                        "ack timeout elapsed, message reverted to ready"
                    );
                    if entry.message.ack_attempts() > self.config.max_redeliveries {
                        exhausted.push(*id);
                    }
                }
            }
        }

        exhausted
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .map(|entry| {
                warn!(
                    message_id = %entry.message.id,
                    kind = %entry.message.kind,
                    max_redeliveries = self.config.max_redeliveries,
                    "redelivery budget exhausted, handing message to dead-message handlers"
                );
                entry.message
            })
            .collect()
    }

    fn make_ack(&self, entry_id: Uuid) -> Ack {
        let entries = self.entries.clone();
        Ack::new(move || async move {
            let mut entries = entries.lock().await;
            entries.remove(&entry_id);
            Ok(())
        })
    }

    async fn notify_dead(&self, messages: Vec<Message>) {
        for message in messages {
            for handler in &self.dead_handlers {
                handler.handle(self, &message).await;
            }
        }
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    fn ack_timeout(&self) -> Duration {
        self.config.ack_timeout()
    }

    fn can_poll_many(&self) -> bool {
        true
    }

    async fn push(&self, message: Message, delay: Duration) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        debug!(message_id = %message.id, kind = %message.kind, ?delay, "pushing message");
        entries.insert(
            Uuid::new_v4(),
            Entry {
                message,
                state: EntryState::Queued {
                    deliver_at: Instant::now() + delay,
                },
            },
        );
        Ok(())
    }

    async fn ensure(&self, message: Message, delay: Duration) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        if entries.values().any(|e| e.message.is_equivalent(&message)) {
            debug!(kind = %message.kind, "equivalent message already queued, skipping");
            return Ok(());
        }
        entries.insert(
            Uuid::new_v4(),
            Entry {
                message,
                state: EntryState::Queued {
                    deliver_at: Instant::now() + delay,
                },
            },
        );
        Ok(())
    }

    async fn poll(&self) -> Result<Option<Delivery>, QueueError> {
        Ok(self.poll_many(1).await?.pop())
    }

    async fn poll_many(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let now = Instant::now();
        let mut deliveries = Vec::new();

        let dead = {
            let mut entries = self.entries.lock().await;
            let dead = self.sweep(&mut entries, now);

            let mut ready: Vec<(Uuid, Instant)> = entries
                .iter()
                .filter_map(|(id, entry)| match entry.state {
                    EntryState::Queued { deliver_at } if deliver_at <= now => {
                        Some((*id, deliver_at))
                    }
                    _ => None,
                })
                .collect();
            ready.sort_by_key(|(_, deliver_at)| *deliver_at);

            for (id, _) in ready.into_iter().take(max) {
                if let Some(entry) = entries.get_mut(&id) {
                    let timeout = entry.message.ack_timeout(self.config.ack_timeout());
                    entry.state = EntryState::Claimed {
                        deadline: now + timeout,
                    };
                    deliveries.push(Delivery {
                        message: entry.message.clone(),
                        ack: self.make_ack(id),
                    });
                }
            }

            dead
        };

        self.notify_dead(dead).await;
        Ok(deliveries)
    }

    async fn reschedule(&self, message: &Message, delay: Duration) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .values_mut()
            .find(|e| e.message.id == message.id)
            .ok_or(QueueError::MessageNotFound(message.id))?;
        entry.state = EntryState::Queued {
            deliver_at: Instant::now() + delay,
        };
        debug!(message_id = %message.id, ?delay, "message rescheduled");
        Ok(())
    }

    async fn contains_message(
        &self,
        predicate: MessagePredicate<'_>,
    ) -> Result<bool, QueueError> {
        let entries = self.entries.lock().await;
        Ok(entries.values().any(|e| predicate(&e.message)))
    }

    async fn read_state(&self) -> Result<QueueState, QueueError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;

        let mut depth = 0;
        let mut ready = 0;
        let mut unacked = 0;
        for entry in entries.values() {
            match entry.state {
                EntryState::Queued { deliver_at } => {
                    depth += 1;
                    if deliver_at <= now {
                        ready += 1;
                    }
                }
                EntryState::Claimed { .. } => unacked += 1,
            }
        }

        Ok(QueueState {
            depth,
            ready,
            unacked,
        })
    }
}

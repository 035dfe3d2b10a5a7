//! The queue processing engine.
//!
//! On each tick the processor checks its activation gates, measures free
//! executor capacity, claims at most that many messages, and dispatches
//! each to a registered handler. All failure paths are absorbed here:
//! handler errors are logged and published, executor rejections are
//! rescheduled with jitter, and unroutable messages are quarantined. The
//! processor never raises to its driver.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::ProcessorConfig;
use crate::error::QueueError;
use crate::event::{EventListener, EventPublisher, QueueEvent};
use crate::handler::{HandlerRegistry, MessageHandler};
use crate::pool::HandlerPool;
use crate::queue::{Activator, DeadMessageHandler, Delivery, Queue};

/// Drains a [`Queue`] under bounded local concurrency.
pub struct QueueProcessor {
    queue: Arc<dyn Queue>,
    pool: Arc<HandlerPool>,
    registry: HandlerRegistry,
    activators: Vec<Arc<dyn Activator>>,
    dead_handlers: Vec<Arc<dyn DeadMessageHandler>>,
    publisher: EventPublisher,
    config: ProcessorConfig,
}

impl QueueProcessor {
    /// Start building a processor for the given queue.
    pub fn builder(queue: Arc<dyn Queue>) -> QueueProcessorBuilder {
        QueueProcessorBuilder::new(queue)
    }

    /// The queue this processor drains.
    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    /// The bounded executor handler work runs on.
    pub fn pool(&self) -> &Arc<HandlerPool> {
        &self.pool
    }

    fn enabled(&self) -> bool {
        self.activators.iter().all(|a| a.enabled())
    }

    /// Run one scheduling cycle.
    ///
    /// Public so external drivers and tests can drive the processor on
    /// their own cadence instead of [`QueueProcessor::run`].
    pub async fn tick(&self) {
        if !self.enabled() {
            debug!("an activator reports disabled, skipping tick");
            return;
        }

        let capacity = self.pool.available_capacity();
        if capacity == 0 {
            debug!("no free handler capacity, skipping poll");
            self.publisher.publish(QueueEvent::NoHandlerCapacity);
            return;
        }

        let deliveries = match self.claim(capacity).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                error!(error = %e, "queue poll failed");
                return;
            }
        };

        for delivery in deliveries {
            self.dispatch(delivery).await;
        }
    }

    /// Claim up to `capacity` messages, honoring the backend's multi-claim
    /// capability.
    async fn claim(&self, capacity: usize) -> Result<Vec<Delivery>, QueueError> {
        if self.queue.can_poll_many() {
            return self.queue.poll_many(capacity).await;
        }

        let mut deliveries = Vec::new();
        for _ in 0..capacity {
            match self.queue.poll().await? {
                Some(delivery) => deliveries.push(delivery),
                None => break,
            }
        }
        Ok(deliveries)
    }

    async fn dispatch(&self, delivery: Delivery) {
        let Delivery { message, ack } = delivery;

        let Some(handler) = self.registry.resolve(&message.kind) else {
            // No handler can ever take this message: quarantine it.
            error!(
                message_id = %message.id,
                kind = %message.kind,
                "no handler registered for message kind, dead-lettering"
            );
            for sink in &self.dead_handlers {
                sink.handle(self.queue.as_ref(), &message).await;
            }
            self.publisher.publish(QueueEvent::MessageDead {
                message_id: message.id,
                kind: message.kind.clone(),
            });
            if let Err(e) = ack.ack().await {
                error!(error = %e, message_id = %message.id, "failed to ack dead message");
            }
            return;
        };

        let permit = match self.pool.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                // Capacity was taken between the capacity check and this
                // submission. Push the message back ourselves rather than
                // letting the claim expire unacked.
                let delay = self.config.requeue_delay() + jitter(self.config.requeue_max_jitter());
                warn!(
                    message_id = %message.id,
                    kind = %message.kind,
                    attempts = message.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "executor at capacity, rescheduling message"
                );
                if let Err(e) = self.queue.reschedule(&message, delay).await {
                    error!(error = %e, message_id = %message.id, "failed to reschedule message");
                }
                self.publisher.publish(QueueEvent::MessageRescheduled {
                    message_id: message.id,
                    kind: message.kind.clone(),
                    delay_ms: delay.as_millis() as u64,
                });
                return;
            }
        };

        let publisher = self.publisher.clone();
        let span = info_span!("message", message_id = %message.id, kind = %message.kind);
        let task = async move {
            match handler.handle(&message).await {
                Ok(()) => match ack.ack().await {
                    Ok(()) => publisher.publish(QueueEvent::MessageProcessed {
                        message_id: message.id,
                        kind: message.kind.clone(),
                    }),
                    Err(e) => error!(error = %e, "failed to ack processed message"),
                },
                Err(e) => {
                    // Not acked: the queue redelivers after the ack timeout.
                    error!(error = %e, "handler failed, message left unacked");
                    publisher.publish(QueueEvent::HandlerError {
                        message_id: message.id,
                        kind: message.kind.clone(),
                        error: e.to_string(),
                    });
                }
            }
        };

        self.pool.execute(permit, task.instrument(span));
    }

    /// Tick on a fixed cadence until a shutdown signal arrives.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_ms = self.config.poll_interval_ms,
            "queue processor started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("queue processor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.pool.stop();
    }

    /// Spawn the tick loop, returning a handle for shutdown.
    pub fn start(self: &Arc<Self>) -> ProcessorHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let join = tokio::spawn(self.clone().run(shutdown_rx));
        ProcessorHandle { shutdown_tx, join }
    }
}

/// Handle to a running processor loop.
pub struct ProcessorHandle {
    shutdown_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Signal the loop to stop after its current tick.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for the loop to exit.
    pub async fn stopped(self) {
        let _ = self.join.await;
    }
}

/// Builder for [`QueueProcessor`].
pub struct QueueProcessorBuilder {
    queue: Arc<dyn Queue>,
    pool: Option<Arc<HandlerPool>>,
    registry: HandlerRegistry,
    activators: Vec<Arc<dyn Activator>>,
    dead_handlers: Vec<Arc<dyn DeadMessageHandler>>,
    publisher: EventPublisher,
    config: ProcessorConfig,
}

impl QueueProcessorBuilder {
    /// Create a builder for the given queue.
    pub fn new(queue: Arc<dyn Queue>) -> Self {
        Self {
            queue,
            pool: None,
            registry: HandlerRegistry::new(),
            activators: Vec::new(),
            dead_handlers: Vec::new(),
            publisher: EventPublisher::new(),
            config: ProcessorConfig::default(),
        }
    }

    /// Use a shared executor instead of one built from the config.
    pub fn pool(mut self, pool: Arc<HandlerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Register a message handler.
    pub fn handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.registry.register(handler);
        self
    }

    /// Register an activation gate.
    pub fn activator(mut self, activator: Arc<dyn Activator>) -> Self {
        self.activators.push(activator);
        self
    }

    /// Register a sink for unroutable messages.
    pub fn dead_message_handler(mut self, handler: Arc<dyn DeadMessageHandler>) -> Self {
        self.dead_handlers.push(handler);
        self
    }

    /// Register an event listener.
    pub fn event_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.publisher.register(listener);
        self
    }

    /// Set the processor configuration.
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the processor. Starts the executor pool.
    pub fn build(self) -> QueueProcessor {
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(HandlerPool::new(self.config.max_concurrency)));
        pool.start();

        QueueProcessor {
            queue: self.queue,
            pool,
            registry: self.registry,
            activators: self.activators,
            dead_handlers: self.dead_handlers,
            publisher: self.publisher,
            config: self.config,
        }
    }
}

/// Uniform random duration in `[0, max]`, derived from the system clock.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    Duration::from_millis(nanos % (max_ms + 1))
}

//! # relayq
//!
//! Durable work queue core with bounded-concurrency message processing.
//!
//! ## Features
//!
//! - At-least-once delivery across concurrent pollers
//! - Pull-based backpressure against a bounded local executor
//! - Ack-timeout redelivery and jittered requeue backoff
//! - Dead-letter quarantine for unroutable messages
//! - Capability-gated no-op backend for disabled configurations

pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod memory;
pub mod message;
pub mod noop;
pub mod pool;
pub mod processor;
pub mod queue;

pub use config::{MemoryQueueConfig, ProcessorConfig};
pub use error::QueueError;
pub use event::{EventListener, EventPublisher, QueueEvent};
pub use handler::{HandlerRegistry, MessageHandler};
pub use memory::InMemoryQueue;
pub use message::{Attribute, AttributeKind, Message};
pub use noop::NoopQueue;
pub use pool::HandlerPool;
pub use processor::{ProcessorHandle, QueueProcessor, QueueProcessorBuilder};
pub use queue::{Ack, Activator, DeadMessageHandler, Delivery, MessagePredicate, Queue, QueueState};

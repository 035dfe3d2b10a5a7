//! Processor and queue configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Tick interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Base delay before a message rejected by the executor becomes
    /// visible again, in milliseconds.
    #[serde(default = "default_requeue_delay_ms")]
    pub requeue_delay_ms: u64,

    /// Upper bound of the random jitter added to the requeue delay,
    /// in milliseconds.
    #[serde(default = "default_requeue_max_jitter_ms")]
    pub requeue_max_jitter_ms: u64,

    /// Maximum number of concurrent handler invocations.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_requeue_delay_ms() -> u64 {
    5_000
}

fn default_requeue_max_jitter_ms() -> u64 {
    2_000
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            requeue_delay_ms: default_requeue_delay_ms(),
            requeue_max_jitter_ms: default_requeue_max_jitter_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl ProcessorConfig {
    /// Tick interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Requeue base delay as a [`Duration`].
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_ms)
    }

    /// Requeue jitter upper bound as a [`Duration`].
    pub fn requeue_max_jitter(&self) -> Duration {
        Duration::from_millis(self.requeue_max_jitter_ms)
    }
}

/// In-memory queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQueueConfig {
    /// Default claim-to-presumed-lost duration in milliseconds.
    /// Individual messages may override it.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// How many ack-timeout redeliveries a message gets before the
    /// queue hands it to its dead-message handlers.
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
}

fn default_ack_timeout_ms() -> u64 {
    60_000
}

fn default_max_redeliveries() -> u32 {
    5
}

impl Default for MemoryQueueConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            max_redeliveries: default_max_redeliveries(),
        }
    }
}

impl MemoryQueueConfig {
    /// Default ack timeout as a [`Duration`].
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

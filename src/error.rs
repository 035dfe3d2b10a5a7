//! Queue errors.

use thiserror::Error;
use uuid::Uuid;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No queue entry matches the given message.
    #[error("message not found: {0}")]
    MessageNotFound(Uuid),

    /// Backing store failure.
    #[error("queue backend error: {0}")]
    Backend(String),

    /// Handler invocation failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// The bounded executor refused a submission.
    #[error("executor rejected submission")]
    ExecutorRejected,

    /// Generic error.
    #[error("{0}")]
    Custom(String),
}

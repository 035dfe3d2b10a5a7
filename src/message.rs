//! Message envelope and attribute bag.
//!
//! A [`Message`] is a tag-discriminated payload plus a small typed metadata
//! bag. Attributes track the redelivery lifecycle; the payload itself is
//! logically immutable once enqueued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Attribute kinds. At most one attribute of each kind exists per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    /// Handler invocations that completed without an ack.
    Attempts,
    /// Redeliveries issued by the queue after an elapsed ack timeout.
    AckAttempts,
    /// Combined counter kept for older payloads.
    TotalAttempts,
}

/// Typed message metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attribute {
    /// Count of handler invocations that completed without acking.
    ///
    /// Incremented by application retries and by the processor's own
    /// backpressure path, never by the queue's ack-timeout sweep.
    Attempts { count: u32 },

    /// Count of times the queue itself redelivered the message because no
    /// ack arrived before its ack timeout elapsed (presumed worker loss).
    AckAttempts { count: u32 },

    /// Combined attempt counter. Still written so older consumers keep
    /// seeing it, but scheduling never consults it.
    #[deprecated(note = "superseded by Attempts and AckAttempts")]
    TotalAttempts { count: u32 },
}

impl Attribute {
    /// The kind tag of this attribute.
    #[allow(deprecated)]
    pub fn kind(&self) -> AttributeKind {
        match self {
            Attribute::Attempts { .. } => AttributeKind::Attempts,
            Attribute::AckAttempts { .. } => AttributeKind::AckAttempts,
            Attribute::TotalAttempts { .. } => AttributeKind::TotalAttempts,
        }
    }

    /// The counter value carried by this attribute.
    #[allow(deprecated)]
    pub fn count(&self) -> u32 {
        match self {
            Attribute::Attempts { count }
            | Attribute::AckAttempts { count }
            | Attribute::TotalAttempts { count } => *count,
        }
    }
}

/// A unit of work on the queue.
///
/// The `kind` tag discriminates the payload variant; handler dispatch and
/// serialization both key off it. Two messages are logically equivalent when
/// their kind and payload match, regardless of id or attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID, used for correlation and queue-entry addressing.
    pub id: Uuid,
    /// Payload discriminator tag.
    pub kind: String,
    /// Payload body.
    pub payload: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Per-message ack-timeout override in milliseconds. Absent this, the
    /// queue-wide default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_timeout_ms: Option<u64>,
    /// Attribute bag, at most one entry per [`AttributeKind`].
    #[serde(default)]
    attributes: Vec<Attribute>,
}

impl Message {
    /// Create a new message.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            created_at: Utc::now(),
            ack_timeout_ms: None,
            attributes: Vec::new(),
        }
    }

    /// Set a per-message ack-timeout override.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.set_attribute(attribute);
        self
    }

    /// Set an attribute, replacing any existing attribute of the same kind.
    pub fn set_attribute(&mut self, attribute: Attribute) {
        match self.attributes.iter_mut().find(|a| a.kind() == attribute.kind()) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Get the attribute of the given kind, if set.
    pub fn attribute(&self, kind: AttributeKind) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.kind() == kind)
    }

    /// All attributes currently set on the message.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Count of handler invocations that completed without acking.
    pub fn attempts(&self) -> u32 {
        self.attribute(AttributeKind::Attempts).map_or(0, Attribute::count)
    }

    /// Count of queue-side ack-timeout redeliveries.
    pub fn ack_attempts(&self) -> u32 {
        self.attribute(AttributeKind::AckAttempts).map_or(0, Attribute::count)
    }

    /// Record one more handler invocation that ended without an ack.
    pub fn increment_attempts(&mut self) {
        let count = self.attempts() + 1;
        self.set_attribute(Attribute::Attempts { count });
        self.bump_total_attempts();
    }

    /// Record one more queue-side redelivery after an elapsed ack timeout.
    pub fn increment_ack_attempts(&mut self) {
        let count = self.ack_attempts() + 1;
        self.set_attribute(Attribute::AckAttempts { count });
        self.bump_total_attempts();
    }

    // Older consumers still read the combined counter, so it is kept in
    // step with the two counters that actually drive scheduling.
    #[allow(deprecated)]
    fn bump_total_attempts(&mut self) {
        let count = match self.attribute(AttributeKind::TotalAttempts) {
            Some(attr) => attr.count() + 1,
            None => self.attempts() + self.ack_attempts(),
        };
        self.set_attribute(Attribute::TotalAttempts { count });
    }

    /// Whether two messages describe the same unit of work.
    ///
    /// Compares kind and payload only; id and attributes are delivery-side
    /// state and do not participate in logical identity.
    pub fn is_equivalent(&self, other: &Message) -> bool {
        self.kind == other.kind && self.payload == other.payload
    }

    /// The effective ack timeout, resolving the per-message override
    /// against the queue-wide default.
    pub fn ack_timeout(&self, default: Duration) -> Duration {
        self.ack_timeout_ms.map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_new() {
        let message = Message::new("bake", json!({"region": "us-west-1"}));
        assert_eq!(message.kind, "bake");
        assert_eq!(message.attempts(), 0);
        assert_eq!(message.ack_attempts(), 0);
        assert!(message.ack_timeout_ms.is_none());
    }

    #[test]
    fn test_set_attribute_replaces_same_kind() {
        let mut message = Message::new("bake", json!({}));
        message.set_attribute(Attribute::Attempts { count: 1 });
        message.set_attribute(Attribute::Attempts { count: 2 });

        assert_eq!(message.attributes().len(), 1);
        assert_eq!(message.attempts(), 2);
    }

    #[test]
    fn test_one_attribute_per_kind() {
        let mut message = Message::new("bake", json!({}));
        message.increment_attempts();
        message.increment_attempts();
        message.increment_ack_attempts();

        let kinds: Vec<AttributeKind> = message.attributes().iter().map(Attribute::kind).collect();
        let mut deduped = kinds.clone();
        deduped.dedup();
        assert_eq!(kinds.len(), deduped.len());
        assert_eq!(message.attempts(), 2);
        assert_eq!(message.ack_attempts(), 1);
    }

    #[test]
    #[allow(deprecated)]
    fn test_total_attempts_maintained_but_not_consulted() {
        let mut message = Message::new("bake", json!({}));
        message.increment_attempts();
        message.increment_ack_attempts();
        message.increment_ack_attempts();

        let total = message.attribute(AttributeKind::TotalAttempts).unwrap().count();
        assert_eq!(total, 3);
        // Scheduling reads these two, never the combined counter.
        assert_eq!(message.attempts(), 1);
        assert_eq!(message.ack_attempts(), 2);
    }

    #[test]
    fn test_equivalence_ignores_id_and_attributes() {
        let a = Message::new("deploy", json!({"cluster": "prod"}));
        let mut b = Message::new("deploy", json!({"cluster": "prod"}));
        b.increment_attempts();

        assert!(a.is_equivalent(&b));
        assert_ne!(a.id, b.id);

        let c = Message::new("deploy", json!({"cluster": "staging"}));
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_ack_timeout_override() {
        let default = Duration::from_secs(60);

        let plain = Message::new("bake", json!({}));
        assert_eq!(plain.ack_timeout(default), default);

        let overridden = Message::new("bake", json!({})).with_ack_timeout(Duration::from_secs(5));
        assert_eq!(overridden.ack_timeout(default), Duration::from_secs(5));
    }

    #[test]
    fn test_attribute_tagged_serialization() {
        let attr = Attribute::AckAttempts { count: 3 };
        let json = serde_json::to_value(attr).unwrap();
        assert_eq!(json, json!({"kind": "ack_attempts", "count": 3}));

        let back: Attribute = serde_json::from_value(json).unwrap();
        assert_eq!(back, attr);
    }
}

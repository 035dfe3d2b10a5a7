//! Message handlers and handler resolution.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::error::QueueError;
use crate::message::Message;

/// Processes messages of one declared kind.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The message kind this handler serves.
    fn message_kind(&self) -> &str;

    /// Whether this handler can process the given kind.
    ///
    /// Defaults to exact equality with [`MessageHandler::message_kind`].
    /// Overriding this lets a handler claim a family of kinds, at the cost
    /// of registration-order resolution (see [`HandlerRegistry::resolve`]).
    fn handles(&self, kind: &str) -> bool {
        kind == self.message_kind()
    }

    /// Process one message. Returning an error leaves the message unacked;
    /// the queue redelivers it once its ack timeout elapses.
    async fn handle(&self, message: &Message) -> Result<(), QueueError>;
}

/// Registry mapping message kinds to handlers.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn MessageHandler>>,
    resolved: DashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            resolved: DashMap::new(),
        }
    }

    /// Register a handler.
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve the handler for a message kind.
    ///
    /// Resolution order: memoized result, exact `message_kind` match, then
    /// the first registered handler whose [`MessageHandler::handles`]
    /// accepts the kind. The fallback scan runs in registration order, so
    /// when two wide-matching handlers both accept a kind, the earlier
    /// registration wins and silently shadows the later one. The outcome is
    /// memoized per kind.
    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn MessageHandler>> {
        if let Some(handler) = self.resolved.get(kind) {
            return Some(handler.clone());
        }

        let handler = self
            .handlers
            .iter()
            .find(|h| h.message_kind() == kind)
            .or_else(|| self.handlers.iter().find(|h| h.handles(kind)))?
            .clone();

        self.resolved.insert(kind.to_string(), handler.clone());
        Some(handler)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ExactHandler {
        kind: &'static str,
    }

    #[async_trait]
    impl MessageHandler for ExactHandler {
        fn message_kind(&self) -> &str {
            self.kind
        }

        async fn handle(&self, _message: &Message) -> Result<(), QueueError> {
            Ok(())
        }
    }

    struct PrefixHandler {
        prefix: &'static str,
    }

    #[async_trait]
    impl MessageHandler for PrefixHandler {
        fn message_kind(&self) -> &str {
            self.prefix
        }

        fn handles(&self, kind: &str) -> bool {
            kind.starts_with(self.prefix)
        }

        async fn handle(&self, _message: &Message) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[test]
    fn test_exact_resolution() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(ExactHandler { kind: "bake" }));
        registry.register(Arc::new(ExactHandler { kind: "deploy" }));

        let handler = registry.resolve("deploy").unwrap();
        assert_eq!(handler.message_kind(), "deploy");
        assert!(registry.resolve("canary").is_none());
    }

    #[test]
    fn test_fallback_scan_on_exact_miss() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(PrefixHandler { prefix: "deploy" }));

        let handler = registry.resolve("deploy:canary").unwrap();
        assert_eq!(handler.message_kind(), "deploy");
    }

    #[test]
    fn test_exact_match_beats_wide_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(PrefixHandler { prefix: "deploy" }));
        registry.register(Arc::new(ExactHandler { kind: "deploy:canary" }));

        let handler = registry.resolve("deploy:canary").unwrap();
        assert!(handler.handles("deploy:canary"));
        assert_eq!(handler.message_kind(), "deploy:canary");
    }

    #[test]
    fn test_registration_order_shadows_wide_handlers() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(PrefixHandler { prefix: "de" }));
        registry.register(Arc::new(PrefixHandler { prefix: "deploy" }));

        // Both accept the kind; the earlier registration wins.
        let handler = registry.resolve("deploy:prod").unwrap();
        assert_eq!(handler.message_kind(), "de");
    }

    #[test]
    fn test_resolution_is_memoized() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(PrefixHandler { prefix: "bake" }));

        assert!(registry.resolve("bake:ami").is_some());
        assert!(registry.resolved.contains_key("bake:ami"));
    }
}

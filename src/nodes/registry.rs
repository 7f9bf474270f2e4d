/// Node type registry
///
/// Maps node type keys to handler instances. Built once at startup; the
/// executor only reads from it.

use crate::nodes::{
    http::HttpRequestNode,
    transform::{ExtractNode, NoopNode, SetNode},
    triggers::{ManualTrigger, SignedWebhookTrigger, WebhookTrigger},
    NodeHandler,
};
use std::{collections::HashMap, fmt, sync::Arc};

#[derive(Clone, Default)]
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl NodeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in node type
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ManualTrigger));
        registry.register(Arc::new(WebhookTrigger));
        registry.register(Arc::new(SignedWebhookTrigger));
        registry.register(Arc::new(SetNode));
        registry.register(Arc::new(ExtractNode));
        registry.register(Arc::new(NoopNode));
        registry.register(Arc::new(HttpRequestNode::new()));
        registry
    }

    /// Add or replace the handler for its type key
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) -> Option<Arc<dyn NodeHandler>> {
        let key = handler.node_type().to_string();
        tracing::debug!("🧩 Registered node type: {}", key);
        self.handlers.insert(key, handler)
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Whether the type is a start-typed node; unknown types are not
    pub fn is_trigger(&self, node_type: &str) -> bool {
        self.handlers
            .get(node_type)
            .map(|h| h.is_trigger())
            .unwrap_or(false)
    }

    /// Registered type keys, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = NodeRegistry::with_builtins();
        for key in [
            "manual_trigger",
            "webhook_trigger",
            "signed_webhook_trigger",
            "set",
            "extract",
            "noop",
            "http_request",
        ] {
            assert!(registry.contains(key), "missing {}", key);
        }
        assert!(registry.is_trigger("manual_trigger"));
        assert!(!registry.is_trigger("http_request"));
        assert!(!registry.is_trigger("does_not_exist"));
    }

    #[test]
    fn register_replaces_existing_handler() {
        let mut registry = NodeRegistry::new();
        assert!(registry.register(Arc::new(NoopNode)).is_none());
        assert!(registry.register(Arc::new(NoopNode)).is_some());
        assert_eq!(registry.types(), vec!["noop"]);
    }
}

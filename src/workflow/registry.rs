// SPDX-License-Identifier: MIT

use crate::workflow::graph::Node;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Named node callables that `kind: handler` definitions resolve
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn Node>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, name: impl Into<String>, handler: impl Node + 'static) {
        self.register_shared(name, Arc::new(handler)).await;
    }

    pub async fn register_shared(&self, name: impl Into<String>, handler: Arc<dyn Node>) {
        let name = name.into();
        let mut handlers = self.handlers.write().await;
        if handlers.insert(name.clone(), handler).is_some() {
            log::warn!("Handler '{}' was already registered; replacing it", name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Node>> {
        let handlers = self.handlers.read().await;
        handlers.get(name).cloned()
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
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
    use crate::workflow::graph::{node_fn, StaticNode};
    use crate::workflow::state::{StateSchema, StateUpdate, WorkflowState};
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = HandlerRegistry::new();
        registry
            .register("noop", StaticNode::new(StateUpdate::new()))
            .await;

        assert!(registry.get("noop").await.is_some());
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let registry = HandlerRegistry::new();
        registry
            .register("h", StaticNode::new(StateUpdate::new().set("v", 1)))
            .await;
        registry
            .register(
                "h",
                node_fn(|_: &WorkflowState| Ok(StateUpdate::new().set("v", 2))),
            )
            .await;

        let handler = registry.get("h").await.unwrap();
        let update = handler
            .run(&WorkflowState::new(StateSchema::new()))
            .await
            .unwrap();
        assert_eq!(update.get("v"), Some(&json!(2)));
        assert_eq!(registry.names().await, vec!["h"]);
    }

    #[tokio::test]
    async fn test_clones_share_handlers() {
        let registry = HandlerRegistry::new();
        let clone = registry.clone();
        clone.register("a", StaticNode::default()).await;
        clone.register("b", StaticNode::default()).await;
        assert_eq!(registry.names().await, vec!["a", "b"]);
    }
}

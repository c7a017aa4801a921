// SPDX-License-Identifier: MIT

//! Workflow builder - orchestrates workflow construction
//!
//! This module provides the high-level Builder that loads workflow definitions
//! and turns them into compiled graphs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::embedding::Embedder;
use crate::adk::error::FlowError;
use crate::adk::history::HistoryStore;
use crate::adk::model::{GenerationConfig, Model};
use crate::config::Settings;
use crate::workflow::condition::{ConditionRouter, FieldRouter};
use crate::workflow::graph::{
    CompileOptions, CompiledGraph, Destination, Node, StateGraph, StaticNode, UnreachablePolicy,
};
use crate::workflow::llm::{HistoryBinding, LlmNode};
use crate::workflow::loader::WorkflowLoader;
use crate::workflow::registry::HandlerRegistry;
use crate::workflow::retrieve::RetrieveNode;
use crate::workflow::state::StateUpdate;
use crate::workflow::types::{
    EdgeDefinition, GraphDefinition, LlmDefinition, NodeDefinition, NodeKind, RetrieveDefinition,
    RouteDefinition,
};

/// High-level builder for constructing workflows from YAML definitions
pub struct Builder {
    loader: WorkflowLoader,
    registry: HandlerRegistry,
    model: Option<Arc<dyn Model>>,
    history: Option<Arc<dyn HistoryStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    settings: Settings,
    unreachable: UnreachablePolicy,
}

impl Builder {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            loader: WorkflowLoader::new(),
            registry,
            model: None,
            history: None,
            embedder: None,
            settings: Settings::default(),
            unreachable: UnreachablePolicy::Warn,
        }
    }

    /// Model used by `kind: llm` nodes
    pub fn with_model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// Store backing `history:` sections of `kind: llm` nodes
    pub fn with_history(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    /// Embedder used by `kind: retrieve` nodes
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_unreachable_policy(mut self, policy: UnreachablePolicy) -> Self {
        self.unreachable = policy;
        self
    }

    /// Build a compiled graph from a YAML file path
    pub async fn build_file<P: AsRef<Path>>(&self, path: P) -> Result<CompiledGraph, FlowError> {
        let def = self.loader.load_workflow(path)?;
        self.build(&def).await
    }

    /// Build a compiled graph from a parsed definition
    pub async fn build(&self, def: &GraphDefinition) -> Result<CompiledGraph, FlowError> {
        let mut graph = StateGraph::new(def.name.clone(), def.state.clone());

        for node_def in &def.nodes {
            let node = self.build_node(node_def).await?;
            graph.add_shared_node(node_def.id.clone(), node)?;
        }

        graph.set_entry_point(def.entry.clone())?;

        for edge in &def.edges {
            self.add_edge(&mut graph, edge)?;
        }

        let options = CompileOptions {
            unreachable: self.unreachable,
            max_steps: def.max_steps.unwrap_or(self.settings.max_steps),
        };
        let compiled = graph.compile_with(&options)?;

        log::info!(
            "Built workflow '{}' with {} nodes",
            def.name,
            def.nodes.len()
        );
        Ok(compiled)
    }

    async fn build_node(&self, def: &NodeDefinition) -> Result<Arc<dyn Node>, FlowError> {
        match &def.kind {
            NodeKind::Handler { handler } => self
                .registry
                .get(handler)
                .await
                .ok_or_else(|| FlowError::handler_not_found(handler.clone())),
            NodeKind::Llm(llm) => Ok(Arc::new(self.build_llm_node(&def.id, llm)?)),
            NodeKind::Set { values } => Ok(Arc::new(StaticNode::new(StateUpdate::from(
                values.clone(),
            )))),
            NodeKind::Retrieve(retrieve) => {
                Ok(Arc::new(self.build_retrieve_node(&def.id, retrieve)?))
            }
        }
    }

    fn build_llm_node(&self, id: &str, def: &LlmDefinition) -> Result<LlmNode, FlowError> {
        let model = self.model.clone().ok_or_else(|| {
            FlowError::config(format!("node '{}' needs a model but none was configured", id))
        })?;

        let default_timeout = if def.stream {
            self.settings.extended_timeout
        } else {
            self.settings.timeout
        };
        let config = GenerationConfig {
            model: def.model.as_deref().map(|m| self.settings.resolve_model(m)),
            temperature: def.temperature.map(|t| t.value()),
            timeout: Some(
                def.timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(default_timeout),
            ),
            max_output_tokens: None,
        };
        config.validate()?;

        let mut node = LlmNode::new(model, def.prompt.clone())
            .output(def.output.clone())
            .config(config)
            .stream(def.stream);
        if let Some(system) = &def.system {
            node = node.system(system.clone());
        }
        if let Some(field) = &def.transcript {
            node = node.transcript(field.clone());
        }
        if let Some(history) = &def.history {
            let store = self.history.clone().ok_or_else(|| {
                FlowError::config(format!(
                    "node '{}' uses history but no history store was configured",
                    id
                ))
            })?;
            node = node.history(HistoryBinding {
                store,
                session_field: history.session_field.clone(),
                window: history.window,
            });
        }
        Ok(node)
    }

    fn build_retrieve_node(
        &self,
        id: &str,
        def: &RetrieveDefinition,
    ) -> Result<RetrieveNode, FlowError> {
        let embedder = self.embedder.clone().ok_or_else(|| {
            FlowError::config(format!(
                "node '{}' needs an embedder but none was configured",
                id
            ))
        })?;
        if def.documents.is_empty() {
            return Err(FlowError::definition(format!(
                "retrieve node '{}' has no documents",
                id
            )));
        }
        if def.k == 0 {
            return Err(FlowError::definition(format!(
                "retrieve node '{}' must return at least one document",
                id
            )));
        }

        Ok(RetrieveNode::new(embedder, def.documents.clone(), def.query.clone())
            .k(def.k)
            .output(def.output.clone()))
    }

    fn add_edge(&self, graph: &mut StateGraph, def: &EdgeDefinition) -> Result<(), FlowError> {
        let forms = [def.to.is_some(), !def.routes.is_empty(), def.route_on.is_some()];
        if forms.iter().filter(|set| **set).count() != 1 {
            return Err(FlowError::definition(format!(
                "edge from '{}' must set exactly one of 'to', 'routes' or 'route_on'",
                def.from
            )));
        }

        if let Some(to) = &def.to {
            graph.add_edge(def.from.clone(), Destination::parse(to))?;
        } else if let Some(field) = &def.route_on {
            if def.map.is_empty() {
                return Err(FlowError::definition(format!(
                    "edge from '{}' routes on '{}' but has an empty map",
                    def.from, field
                )));
            }
            let routes = def
                .map
                .iter()
                .map(|(label, to)| (label.clone(), Destination::parse(to)));
            graph.add_conditional_edges(def.from.clone(), FieldRouter::new(field.clone()), routes)?;
        } else {
            let (router, routes) = build_condition_router(&def.from, &def.routes)?;
            graph.add_conditional_edges(def.from.clone(), router, routes)?;
        }
        Ok(())
    }
}

fn build_condition_router(
    from: &str,
    routes: &[RouteDefinition],
) -> Result<(ConditionRouter, BTreeMap<String, Destination>), FlowError> {
    let mut router = ConditionRouter::new();
    let mut map: BTreeMap<String, Destination> = BTreeMap::new();

    for (i, route) in routes.iter().enumerate() {
        let label = route.label().to_string();
        let dest = Destination::parse(&route.to);

        if let Some(existing) = map.get(&label) {
            if *existing != dest {
                return Err(FlowError::definition(format!(
                    "edge from '{}' maps label '{}' to both '{}' and '{}'",
                    from, label, existing, dest
                )));
            }
        }

        match &route.when {
            Some(condition) => router = router.when(condition, label.clone())?,
            None if i + 1 == routes.len() => router = router.otherwise(label.clone()),
            None => {
                return Err(FlowError::definition(format!(
                    "edge from '{}': the route without 'when' must be the last one",
                    from
                )))
            }
        }
        map.insert(label, dest);
    }

    Ok((router, map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::{EmbeddingError, ModelError};
    use crate::adk::model::Message;
    use crate::workflow::graph::node_fn;
    use crate::workflow::state::WorkflowState;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records the generation config of every call
    #[derive(Default)]
    struct ConfigRecorder {
        seen: Mutex<Vec<GenerationConfig>>,
    }

    #[async_trait]
    impl Model for ConfigRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            config: &GenerationConfig,
        ) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(config.clone());
            Ok("ok".to_string())
        }
    }

    /// One dimension per letter of "rust"
    struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok("rust"
                .chars()
                .map(|l| text.chars().filter(|c| *c == l).count() as f32)
                .collect())
        }
    }

    const COUNTER: &str = r#"
name: counter
entry: process
state:
  count: { type: integer, default: 0 }
nodes:
  - id: process
    kind: handler
    handler: increment
edges:
  - from: process
    routes:
      - when: "count < 5"
        label: continue
        to: process
      - label: end
        to: END
"#;

    async fn registry() -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        registry
            .register(
                "increment",
                node_fn(|s: &WorkflowState| {
                    Ok(StateUpdate::new().set("count", s.get_i64("count").unwrap_or(0) + 1))
                }),
            )
            .await;
        registry
    }

    #[tokio::test]
    async fn test_build_and_run_counter() {
        let def = WorkflowLoader::parse_yaml(COUNTER).unwrap();
        let graph = Builder::new(registry().await).build(&def).await.unwrap();

        assert_eq!(graph.max_steps(), 100);
        let state = graph.invoke(json!({})).await.unwrap();
        assert_eq!(state.get_i64("count"), Some(5));
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let def = WorkflowLoader::parse_yaml(COUNTER).unwrap();
        let err = Builder::new(HandlerRegistry::new())
            .build(&def)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::HandlerNotFound { ref name } if name == "increment"));
    }

    #[tokio::test]
    async fn test_llm_node_without_model() {
        let yaml = r#"
name: ask
entry: ask
state:
  question: { type: string }
  output: { type: string }
nodes:
  - id: ask
    kind: llm
    prompt: "{question}"
edges:
  - from: ask
    to: END
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        let err = Builder::new(HandlerRegistry::new())
            .build(&def)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[tokio::test]
    async fn test_llm_config_from_definition() {
        let yaml = r#"
name: configured
entry: first
state:
  output: { type: string }
nodes:
  - id: first
    kind: llm
    prompt: "hello"
    model: alternative
    temperature: creative
  - id: second
    kind: llm
    prompt: "hello"
    stream: true
  - id: third
    kind: llm
    prompt: "hello"
    model: mistral
    temperature: 0.1
    stream: true
    timeout_secs: 5
edges:
  - from: first
    to: second
  - from: second
    to: third
  - from: third
    to: END
"#;
        let settings = Settings {
            alt_model: "deepseek-r1:8b".to_string(),
            timeout: Duration::from_secs(30),
            extended_timeout: Duration::from_secs(90),
            ..Settings::default()
        };
        let model = Arc::new(ConfigRecorder::default());
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        let graph = Builder::new(HandlerRegistry::new())
            .with_model(model.clone())
            .with_settings(settings)
            .build(&def)
            .await
            .unwrap();
        graph.invoke(json!({})).await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].model.as_deref(), Some("deepseek-r1:8b"));
        assert_eq!(seen[0].temperature, Some(0.7));
        assert_eq!(seen[0].timeout, Some(Duration::from_secs(30)));

        assert_eq!(seen[1].model, None);
        assert_eq!(seen[1].timeout, Some(Duration::from_secs(90)));

        assert_eq!(seen[2].model.as_deref(), Some("mistral"));
        assert_eq!(seen[2].temperature, Some(0.1));
        assert_eq!(seen[2].timeout, Some(Duration::from_secs(5)));
    }

    const LOOKUP: &str = r#"
name: lookup
entry: lookup
state:
  question: { type: string }
  docs: { type: array }
nodes:
  - id: lookup
    kind: retrieve
    query: "{question}"
    documents: ["rrr", "uuu", "sss"]
    k: 2
    output: docs
edges:
  - from: lookup
    to: END
"#;

    #[tokio::test]
    async fn test_retrieve_node() {
        let def = WorkflowLoader::parse_yaml(LOOKUP).unwrap();
        let graph = Builder::new(HandlerRegistry::new())
            .with_embedder(Arc::new(LetterEmbedder))
            .build(&def)
            .await
            .unwrap();

        let state = graph.invoke(json!({"question": "us"})).await.unwrap();
        let docs = state.get_array("docs").unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.contains(&json!("uuu")));
        assert!(docs.contains(&json!("sss")));
    }

    #[tokio::test]
    async fn test_retrieve_node_checks() {
        let def = WorkflowLoader::parse_yaml(LOOKUP).unwrap();
        let err = Builder::new(HandlerRegistry::new())
            .build(&def)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));

        let empty = LOOKUP.replace(r#"["rrr", "uuu", "sss"]"#, "[]");
        let def = WorkflowLoader::parse_yaml(&empty).unwrap();
        let err = Builder::new(HandlerRegistry::new())
            .with_embedder(Arc::new(LetterEmbedder))
            .build(&def)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Definition(_)));
    }

    #[tokio::test]
    async fn test_edge_must_have_one_form() {
        let yaml = r#"
name: bad
entry: a
nodes:
  - id: a
    kind: set
    values: {}
edges:
  - from: a
    to: END
    route_on: decision
    map: { x: END }
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        let err = Builder::new(HandlerRegistry::new())
            .build(&def)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Definition(_)));
    }

    #[tokio::test]
    async fn test_route_on_field() {
        let yaml = r#"
name: review
entry: review
state:
  decision: { type: string }
  status: { type: string }
nodes:
  - id: review
    kind: set
    values: {}
  - id: approve
    kind: set
    values: { status: approved }
  - id: reject
    kind: set
    values: { status: rejected }
edges:
  - from: review
    route_on: decision
    map: { approve: approve, reject: reject }
  - from: approve
    to: END
  - from: reject
    to: END
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        let graph = Builder::new(HandlerRegistry::new())
            .build(&def)
            .await
            .unwrap();

        let state = graph.invoke(json!({"decision": "reject"})).await.unwrap();
        assert_eq!(state.get_str("status"), Some("rejected"));

        let err = graph.invoke(json!({"decision": "maybe"})).await.unwrap_err();
        assert!(err.error.is_runtime());
    }

    #[tokio::test]
    async fn test_engine_errors_propagate() {
        let yaml = r#"
name: dangling
entry: a
nodes:
  - id: a
    kind: set
    values: {}
edges:
  - from: a
    to: nowhere
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        let err = Builder::new(HandlerRegistry::new())
            .build(&def)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Graph(crate::workflow::error::GraphError::UnknownDestination { .. })
        ));
    }

    #[test]
    fn test_fallback_route_must_be_last() {
        let routes = vec![
            RouteDefinition {
                when: None,
                label: None,
                to: "END".to_string(),
            },
            RouteDefinition {
                when: Some("x > 1".to_string()),
                label: None,
                to: "a".to_string(),
            },
        ];
        assert!(matches!(
            build_condition_router("a", &routes),
            Err(FlowError::Definition(_))
        ));
    }

    #[test]
    fn test_bad_condition() {
        let routes = vec![RouteDefinition {
            when: Some("x >".to_string()),
            label: None,
            to: "END".to_string(),
        }];
        assert!(matches!(
            build_condition_router("a", &routes),
            Err(FlowError::Condition(_))
        ));
    }
}

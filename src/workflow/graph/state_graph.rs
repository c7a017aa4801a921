// SPDX-License-Identifier: MIT

//! Mutable graph builder

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::compiler::{self, CompileOptions, CompiledGraph};
use super::edge::{Destination, Edge, Router, END, START};
use super::node::Node;
use crate::workflow::error::{GraphError, InvalidRule};
use crate::workflow::state::StateSchema;

/// A graph under construction
///
/// Nodes and edges are registered here, then [`StateGraph::compile`] checks
/// the structure and freezes it into a [`CompiledGraph`].
pub struct StateGraph {
    pub(crate) name: String,
    pub(crate) schema: Arc<StateSchema>,
    pub(crate) nodes: BTreeMap<String, Arc<dyn Node>>,
    pub(crate) edges: BTreeMap<String, Edge>,
    pub(crate) entry: Option<String>,
}

impl fmt::Debug for StateGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .finish()
    }
}

impl StateGraph {
    pub fn new(name: impl Into<String>, schema: StateSchema) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            entry: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Register a node under a unique name
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        node: impl Node + 'static,
    ) -> Result<&mut Self, GraphError> {
        self.add_shared_node(name, Arc::new(node))
    }

    /// Register a node that is already shared, e.g. one resolved from a
    /// handler registry
    pub fn add_shared_node(
        &mut self,
        name: impl Into<String>,
        node: Arc<dyn Node>,
    ) -> Result<&mut Self, GraphError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GraphError::GraphInvalid(InvalidRule::EmptyNodeName));
        }
        if name == START || name == END {
            return Err(GraphError::GraphInvalid(InvalidRule::ReservedNodeName(name)));
        }
        if self.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }

        log::debug!("Graph '{}': registered node '{}'", self.name, name);
        self.nodes.insert(name, node);
        Ok(self)
    }

    /// Add an unconditional edge; `from == START` sets the entry point
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<Destination>,
    ) -> Result<&mut Self, GraphError> {
        let from = from.into();
        let to = to.into();

        if from == START {
            let Destination::Node(entry) = to else {
                return Err(GraphError::UnknownDestination {
                    from,
                    to: END.to_string(),
                });
            };
            return self.set_entry_point(entry);
        }

        self.insert_edge(from, Edge::Direct(to))
    }

    /// Add a routed edge: `router` picks a label, `routes` maps labels to
    /// destinations
    pub fn add_conditional_edges<R, I, K, D>(
        &mut self,
        from: impl Into<String>,
        router: R,
        routes: I,
    ) -> Result<&mut Self, GraphError>
    where
        R: Router + 'static,
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<Destination>,
    {
        let routes = routes
            .into_iter()
            .map(|(label, dest)| (label.into(), dest.into()))
            .collect();
        self.insert_edge(
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                routes,
            },
        )
    }

    /// Set the node where every execution begins
    pub fn set_entry_point(&mut self, node: impl Into<String>) -> Result<&mut Self, GraphError> {
        if self.entry.is_some() {
            return Err(GraphError::DuplicateEdge(START.to_string()));
        }
        self.entry = Some(node.into());
        Ok(self)
    }

    fn insert_edge(&mut self, from: String, edge: Edge) -> Result<&mut Self, GraphError> {
        if self.edges.contains_key(&from) {
            return Err(GraphError::DuplicateEdge(from));
        }
        self.edges.insert(from, edge);
        Ok(self)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Validate and freeze with default options
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        self.compile_with(&CompileOptions::default())
    }

    pub fn compile_with(&self, options: &CompileOptions) -> Result<CompiledGraph, GraphError> {
        compiler::compile(self, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::{router_fn, StaticNode};
    use crate::workflow::state::{StateUpdate, WorkflowState};

    fn graph() -> StateGraph {
        StateGraph::new("test", StateSchema::new())
    }

    #[test]
    fn test_duplicate_node_leaves_registry_unchanged() {
        let mut g = graph();
        g.add_node("a", StaticNode::default()).unwrap();

        let err = g
            .add_node("a", StaticNode::new(StateUpdate::new()))
            .err()
            .unwrap();
        assert!(matches!(err, GraphError::DuplicateNode(ref n) if n == "a"));
        assert_eq!(g.node_names(), vec!["a"]);
    }

    #[test]
    fn test_reserved_and_empty_names() {
        let mut g = graph();
        assert!(matches!(
            g.add_node(END, StaticNode::default()),
            Err(GraphError::GraphInvalid(InvalidRule::ReservedNodeName(_)))
        ));
        assert!(matches!(
            g.add_node(START, StaticNode::default()),
            Err(GraphError::GraphInvalid(InvalidRule::ReservedNodeName(_)))
        ));
        assert!(matches!(
            g.add_node("  ", StaticNode::default()),
            Err(GraphError::GraphInvalid(InvalidRule::EmptyNodeName))
        ));
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn test_duplicate_edges() {
        let mut g = graph();
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_edge("a", END).unwrap();

        assert!(matches!(g.add_edge("a", "b"), Err(GraphError::DuplicateEdge(_))));
        assert!(matches!(
            g.add_conditional_edges(
                "a",
                router_fn(|_: &WorkflowState| "x".to_string()),
                [("x", END)]
            ),
            Err(GraphError::DuplicateEdge(_))
        ));
    }

    #[test]
    fn test_start_edge_sets_entry() {
        let mut g = graph();
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_edge(START, "a").unwrap();
        assert_eq!(g.entry.as_deref(), Some("a"));

        assert!(matches!(g.add_edge(START, "a"), Err(GraphError::DuplicateEdge(_))));
        assert!(matches!(g.set_entry_point("a"), Err(GraphError::DuplicateEdge(_))));
    }

    #[test]
    fn test_start_to_end_is_rejected() {
        let mut g = graph();
        assert!(matches!(
            g.add_edge(START, END),
            Err(GraphError::UnknownDestination { .. })
        ));
    }
}

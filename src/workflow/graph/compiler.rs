// SPDX-License-Identifier: MIT

//! Structural validation and the immutable execution plan

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::edge::{Destination, Edge};
use super::node::Node;
use super::state_graph::StateGraph;
use crate::workflow::error::{GraphError, InvalidRule};
use crate::workflow::state::{StateSchema, WorkflowState};

/// Step ceiling used when neither the graph nor the run sets one
pub const DEFAULT_MAX_STEPS: usize = 100;

/// What to do with nodes the entry point can never reach
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnreachablePolicy {
    /// Log and keep them as diagnostics
    #[default]
    Warn,
    /// Fail compilation
    Deny,
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub unreachable: UnreachablePolicy,
    /// Default step ceiling for executions of the compiled graph
    pub max_steps: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            unreachable: UnreachablePolicy::Warn,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl CompileOptions {
    pub fn deny_unreachable(mut self) -> Self {
        self.unreachable = UnreachablePolicy::Deny;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// A non-fatal finding of the compiler
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No path from the entry point leads to this node
    UnreachableNode { node: String },
    /// A mapped label the router declares it never returns
    DeadRoute { node: String, label: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnreachableNode { node } => {
                write!(f, "node '{}' is unreachable from the entry point", node)
            }
            Diagnostic::DeadRoute { node, label } => write!(
                f,
                "route '{}' on '{}' is mapped but never returned by its router",
                label, node
            ),
        }
    }
}

/// Frozen tables shared by every execution of a compiled graph
pub(crate) struct Plan {
    pub(crate) name: String,
    pub(crate) schema: Arc<StateSchema>,
    pub(crate) nodes: BTreeMap<String, Arc<dyn Node>>,
    pub(crate) edges: BTreeMap<String, Edge>,
    pub(crate) entry: String,
    pub(crate) max_steps: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Plan {
    /// Pick the next destination of `node` from the merged state
    pub(crate) fn resolve(
        &self,
        node: &str,
        state: &WorkflowState,
    ) -> Result<Destination, GraphError> {
        match self.edges.get(node) {
            Some(Edge::Direct(dest)) => Ok(dest.clone()),
            Some(Edge::Conditional { router, routes }) => {
                let label = router.route(state);
                routes
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| GraphError::UnroutableLabel {
                        node: node.to_string(),
                        label,
                    })
            }
            // compile() guarantees an outgoing edge for every reachable node
            None => Err(GraphError::GraphInvalid(InvalidRule::MissingOutgoingEdge(
                node.to_string(),
            ))),
        }
    }
}

/// A validated, immutable graph ready to execute
///
/// Cloning shares the plan; independent executions never touch each other.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) plan: Arc<Plan>,
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.plan.name)
            .field("entry", &self.plan.entry)
            .field("nodes", &self.plan.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.plan.edges)
            .finish()
    }
}

/// Comparable description of a compiled plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub name: String,
    pub entry: String,
    pub nodes: Vec<String>,
    pub edges: BTreeMap<String, EdgeSummary>,
    pub max_steps: usize,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeSummary {
    Direct { to: String },
    Conditional { routes: BTreeMap<String, String> },
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.plan.name
    }

    pub fn entry(&self) -> &str {
        &self.plan.entry
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.plan.schema
    }

    pub fn max_steps(&self) -> usize {
        self.plan.max_steps
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.plan.diagnostics
    }

    pub fn summary(&self) -> PlanSummary {
        let edges = self
            .plan
            .edges
            .iter()
            .map(|(from, edge)| {
                let summary = match edge {
                    Edge::Direct(to) => EdgeSummary::Direct { to: to.to_string() },
                    Edge::Conditional { routes, .. } => EdgeSummary::Conditional {
                        routes: routes
                            .iter()
                            .map(|(label, dest)| (label.clone(), dest.to_string()))
                            .collect(),
                    },
                };
                (from.clone(), summary)
            })
            .collect();

        PlanSummary {
            name: self.plan.name.clone(),
            entry: self.plan.entry.clone(),
            nodes: self.plan.nodes.keys().cloned().collect(),
            edges,
            max_steps: self.plan.max_steps,
            diagnostics: self.plan.diagnostics.clone(),
        }
    }
}

pub(crate) fn compile(graph: &StateGraph, options: &CompileOptions) -> Result<CompiledGraph, GraphError> {
    log::info!("Compiling graph '{}'", graph.name);

    graph.schema.validate()?;

    let entry = graph
        .entry
        .clone()
        .ok_or(GraphError::GraphInvalid(InvalidRule::MissingEntryPoint))?;
    if !graph.nodes.contains_key(&entry) {
        return Err(GraphError::GraphInvalid(InvalidRule::UnknownEntryPoint(entry)));
    }

    for (from, edge) in &graph.edges {
        if !graph.nodes.contains_key(from) {
            return Err(GraphError::GraphInvalid(InvalidRule::UnknownEdgeSource(
                from.clone(),
            )));
        }
        for dest in edge.destinations() {
            if let Destination::Node(to) = dest {
                if !graph.nodes.contains_key(to) {
                    return Err(GraphError::UnknownDestination {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }
    }

    let mut diagnostics = Vec::new();
    let mut live_edges: BTreeMap<&str, Vec<&Destination>> = BTreeMap::new();

    for (from, edge) in &graph.edges {
        let live = match edge {
            Edge::Direct(dest) => vec![dest],
            Edge::Conditional { router, routes } => match router.labels() {
                None => routes.values().collect(),
                Some(declared) => {
                    if let Some(label) = declared.iter().find(|l| !routes.contains_key(*l)) {
                        return Err(GraphError::GraphInvalid(InvalidRule::UnmappedRouteLabel {
                            node: from.clone(),
                            label: label.clone(),
                        }));
                    }
                    let mut live = Vec::new();
                    for (label, dest) in routes {
                        if declared.contains(label) {
                            live.push(dest);
                        } else {
                            diagnostics.push(Diagnostic::DeadRoute {
                                node: from.clone(),
                                label: label.clone(),
                            });
                        }
                    }
                    live
                }
            },
        };
        live_edges.insert(from.as_str(), live);
    }

    let (reachable, reaches_end) = find_reachable_nodes(&entry, &live_edges);

    // nodes the entry cannot reach are reported below, edges or not
    if let Some(name) = reachable.iter().find(|n| !graph.edges.contains_key(**n)) {
        return Err(GraphError::GraphInvalid(InvalidRule::MissingOutgoingEdge(
            name.to_string(),
        )));
    }
    if !reaches_end {
        return Err(GraphError::GraphInvalid(InvalidRule::TerminalUnreachable));
    }

    let unreachable: Vec<String> = graph
        .nodes
        .keys()
        .filter(|n| !reachable.contains(n.as_str()))
        .cloned()
        .collect();

    if !unreachable.is_empty() && options.unreachable == UnreachablePolicy::Deny {
        return Err(GraphError::GraphInvalid(InvalidRule::UnreachableNodes(
            unreachable,
        )));
    }
    diagnostics.extend(
        unreachable
            .into_iter()
            .map(|node| Diagnostic::UnreachableNode { node }),
    );
    diagnostics.sort();

    for diagnostic in &diagnostics {
        log::warn!("Graph '{}': {}", graph.name, diagnostic);
    }

    log::info!(
        "Compiled graph '{}': {} nodes, entry '{}'",
        graph.name,
        graph.nodes.len(),
        entry
    );

    Ok(CompiledGraph {
        plan: Arc::new(Plan {
            name: graph.name.clone(),
            schema: Arc::clone(&graph.schema),
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
            entry,
            max_steps: options.max_steps,
            diagnostics,
        }),
    })
}

/// Breadth-first walk over live edges; also reports whether END was seen
fn find_reachable_nodes<'a>(
    entry: &'a str,
    edges: &BTreeMap<&'a str, Vec<&'a Destination>>,
) -> (BTreeSet<&'a str>, bool) {
    let mut reachable = BTreeSet::new();
    let mut reaches_end = false;
    let mut queue = VecDeque::from([entry]);

    while let Some(node) = queue.pop_front() {
        if !reachable.insert(node) {
            continue;
        }
        for dest in edges.get(node).into_iter().flatten() {
            match dest {
                Destination::End => reaches_end = true,
                Destination::Node(next) => {
                    if !reachable.contains(next.as_str()) {
                        queue.push_back(next.as_str());
                    }
                }
            }
        }
    }

    (reachable, reaches_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::{router_fn, StaticNode, END, START};
    use crate::workflow::state::{FieldType, ReducerType, StateFieldDef};

    fn linear() -> StateGraph {
        let mut g = StateGraph::new("linear", StateSchema::new());
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_node("b", StaticNode::default()).unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_edge("a", "b").unwrap();
        g.add_edge("b", END).unwrap();
        g
    }

    #[test]
    fn test_compile_linear() {
        let compiled = linear().compile().unwrap();
        assert_eq!(compiled.entry(), "a");
        assert!(compiled.diagnostics().is_empty());
        assert_eq!(compiled.max_steps(), DEFAULT_MAX_STEPS);
    }

    #[test]
    fn test_missing_entry_point() {
        let mut g = StateGraph::new("g", StateSchema::new());
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_edge("a", END).unwrap();
        assert!(matches!(
            g.compile(),
            Err(GraphError::GraphInvalid(InvalidRule::MissingEntryPoint))
        ));

        g.set_entry_point("nope").unwrap();
        assert!(matches!(
            g.compile(),
            Err(GraphError::GraphInvalid(InvalidRule::UnknownEntryPoint(_)))
        ));
    }

    #[test]
    fn test_unknown_destination() {
        let mut g = StateGraph::new("g", StateSchema::new());
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_conditional_edges(
            "a",
            router_fn(|_: &WorkflowState| "go".to_string()),
            [("go", "ghost"), ("stop", END)],
        )
        .unwrap();
        assert!(matches!(
            g.compile(),
            Err(GraphError::UnknownDestination { ref to, .. }) if to == "ghost"
        ));
    }

    #[test]
    fn test_unknown_edge_source() {
        let mut g = linear();
        g.add_edge("ghost", END).unwrap();
        assert!(matches!(
            g.compile(),
            Err(GraphError::GraphInvalid(InvalidRule::UnknownEdgeSource(_)))
        ));
    }

    #[test]
    fn test_missing_outgoing_edge() {
        let mut g = StateGraph::new("g", StateSchema::new());
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_node("b", StaticNode::default()).unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_edge("a", "b").unwrap();
        assert!(matches!(
            g.compile(),
            Err(GraphError::GraphInvalid(InvalidRule::MissingOutgoingEdge(ref n))) if n == "b"
        ));
    }

    #[test]
    fn test_edgeless_orphan_is_only_unreachable() {
        let mut g = linear();
        g.add_node("orphan", StaticNode::default()).unwrap();

        let compiled = g.compile().unwrap();
        assert_eq!(
            compiled.diagnostics(),
            &[Diagnostic::UnreachableNode {
                node: "orphan".to_string()
            }]
        );
        assert!(compiled.summary().nodes.contains(&"orphan".to_string()));

        assert!(matches!(
            g.compile_with(&CompileOptions::default().deny_unreachable()),
            Err(GraphError::GraphInvalid(InvalidRule::UnreachableNodes(ref nodes))) if nodes == &["orphan".to_string()]
        ));
    }

    #[test]
    fn test_terminal_unreachable() {
        let mut g = StateGraph::new("g", StateSchema::new());
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_edge("a", "a").unwrap();
        assert!(matches!(
            g.compile(),
            Err(GraphError::GraphInvalid(InvalidRule::TerminalUnreachable))
        ));
    }

    #[test]
    fn test_unmapped_declared_label() {
        let mut g = StateGraph::new("g", StateSchema::new());
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_conditional_edges(
            "a",
            router_fn(|_: &WorkflowState| "end".to_string()).with_labels(["end", "retry"]),
            [("end", END)],
        )
        .unwrap();
        assert!(matches!(
            g.compile(),
            Err(GraphError::GraphInvalid(InvalidRule::UnmappedRouteLabel { ref label, .. })) if label == "retry"
        ));
    }

    #[test]
    fn test_dead_route_makes_target_unreachable() {
        let mut g = StateGraph::new("tools", StateSchema::new());
        g.add_node("agent", StaticNode::default()).unwrap();
        g.add_node("tool", StaticNode::default()).unwrap();
        g.add_edge(START, "agent").unwrap();
        g.add_conditional_edges(
            "agent",
            router_fn(|_: &WorkflowState| "answer".to_string()).with_labels(["answer"]),
            [("tool", "tool"), ("answer", END)],
        )
        .unwrap();
        g.add_edge("tool", "agent").unwrap();

        let compiled = g.compile().unwrap();
        assert_eq!(
            compiled.diagnostics(),
            &[
                Diagnostic::UnreachableNode {
                    node: "tool".to_string()
                },
                Diagnostic::DeadRoute {
                    node: "agent".to_string(),
                    label: "tool".to_string()
                },
            ]
        );

        let denied = g.compile_with(&CompileOptions::default().deny_unreachable());
        assert!(matches!(
            denied,
            Err(GraphError::GraphInvalid(InvalidRule::UnreachableNodes(ref nodes))) if nodes == &["tool".to_string()]
        ));
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let schema = StateSchema::new().field(
            "name",
            StateFieldDef::new(FieldType::String).reducer(ReducerType::Max),
        );
        let mut g = StateGraph::new("g", schema);
        g.add_node("a", StaticNode::default()).unwrap();
        g.add_edge(START, "a").unwrap();
        g.add_edge("a", END).unwrap();
        assert!(matches!(g.compile(), Err(GraphError::SchemaViolation { .. })));
    }

    #[test]
    fn test_compile_is_idempotent() {
        let g = linear();
        let first = g.compile().unwrap().summary();
        let second = g.compile().unwrap().summary();
        assert_eq!(first, second);
        assert_eq!(
            first.edges.get("a"),
            Some(&EdgeSummary::Direct { to: "b".to_string() })
        );
    }
}

// SPDX-License-Identifier: MIT

//! Edges, routers and the reserved markers

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::workflow::state::WorkflowState;

/// Terminal marker: routing here ends the execution
pub const END: &str = "__end__";

/// Entry marker: `add_edge(START, node)` sets the entry point
pub const START: &str = "__start__";

/// Where an edge leads
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Destination {
    Node(String),
    End,
}

impl Destination {
    /// Parse a destination name, mapping the terminal marker (and the YAML
    /// spelling `END`) to [`Destination::End`]
    pub fn parse(name: &str) -> Self {
        if name == END || name == "END" {
            Destination::End
        } else {
            Destination::Node(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Destination::Node(name) => name,
            Destination::End => END,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Destination {
    fn from(name: &str) -> Self {
        Destination::parse(name)
    }
}

impl From<String> for Destination {
    fn from(name: String) -> Self {
        Destination::parse(&name)
    }
}

/// Picks a label for a conditional edge from the merged state
pub trait Router: Send + Sync {
    fn route(&self, state: &WorkflowState) -> String;

    /// Every label this router can return, when known
    ///
    /// Declaring labels lets the compiler reject unmapped ones and flag
    /// mapped labels that can never be taken.
    fn labels(&self) -> Option<Vec<String>> {
        None
    }
}

/// Router backed by a closure
pub struct FnRouter<F> {
    func: F,
    labels: Option<Vec<String>>,
}

/// Wrap a closure as a router
pub fn router_fn<F>(func: F) -> FnRouter<F>
where
    F: Fn(&WorkflowState) -> String + Send + Sync,
{
    FnRouter { func, labels: None }
}

impl<F> FnRouter<F> {
    /// Declare the labels the closure can return
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }
}

impl<F> Router for FnRouter<F>
where
    F: Fn(&WorkflowState) -> String + Send + Sync,
{
    fn route(&self, state: &WorkflowState) -> String {
        (self.func)(state)
    }

    fn labels(&self) -> Option<Vec<String>> {
        self.labels.clone()
    }
}

/// The outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    Direct(Destination),
    Conditional {
        router: Arc<dyn Router>,
        routes: BTreeMap<String, Destination>,
    },
}

impl Edge {
    /// Every destination this edge may lead to
    pub fn destinations(&self) -> Vec<&Destination> {
        match self {
            Edge::Direct(dest) => vec![dest],
            Edge::Conditional { routes, .. } => routes.values().collect(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(dest) => f.debug_tuple("Direct").field(dest).finish(),
            Edge::Conditional { router, routes } => f
                .debug_struct("Conditional")
                .field("labels", &router.labels())
                .field("routes", routes)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::StateSchema;

    #[test]
    fn test_destination_parse() {
        assert_eq!(Destination::parse(END), Destination::End);
        assert_eq!(Destination::parse("END"), Destination::End);
        assert_eq!(
            Destination::parse("review"),
            Destination::Node("review".to_string())
        );
        assert_eq!(Destination::End.to_string(), "__end__");
    }

    #[test]
    fn test_fn_router_labels() {
        let router = router_fn(|_: &WorkflowState| "answer".to_string());
        assert!(router.labels().is_none());
        assert_eq!(router.route(&WorkflowState::new(StateSchema::new())), "answer");

        let router = router.with_labels(["answer"]);
        assert_eq!(router.labels(), Some(vec!["answer".to_string()]));
    }

    #[test]
    fn test_edge_destinations() {
        let mut routes = BTreeMap::new();
        routes.insert("a".to_string(), Destination::Node("x".to_string()));
        routes.insert("b".to_string(), Destination::End);
        let edge = Edge::Conditional {
            router: Arc::new(router_fn(|_: &WorkflowState| "a".to_string())),
            routes,
        };
        assert_eq!(edge.destinations().len(), 2);
        assert!(format!("{:?}", edge).contains("Conditional"));
    }
}

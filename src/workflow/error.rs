// SPDX-License-Identifier: MIT

//! Engine error taxonomy
//!
//! Build-time errors (`DuplicateNode`, `DuplicateEdge`, `GraphInvalid`,
//! `UnknownDestination`) reject the graph definition. Run-time errors fail a
//! single execution and are wrapped in an [`ExecutionError`] that carries
//! where the run stopped.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::state::WorkflowState;
use crate::adk::error::BoxError;

/// Errors raised while building, compiling or running a graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// Data does not fit the state schema
    #[error("Schema violation on field '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    /// A node with this name is already registered
    #[error("Node '{0}' is already registered")]
    DuplicateNode(String),

    /// The source already has an outgoing edge definition
    #[error("Node '{0}' already has an outgoing edge")]
    DuplicateEdge(String),

    /// Structural validation failed
    #[error("Invalid graph: {0}")]
    GraphInvalid(InvalidRule),

    /// An edge points at something that is neither a node nor END
    #[error("Edge from '{from}' points to unknown destination '{to}'")]
    UnknownDestination { from: String, to: String },

    /// A router produced a label its edge does not map
    #[error("Router on '{node}' returned unmapped label '{label}'")]
    UnroutableLabel { node: String, label: String },

    /// A node callable failed
    #[error("Node '{node}' failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: BoxError,
    },

    /// The defensive step ceiling was hit
    #[error("Step limit of {limit} exceeded")]
    StepLimitExceeded { limit: usize },
}

/// The specific structural rule a graph broke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidRule {
    MissingEntryPoint,
    UnknownEntryPoint(String),
    EmptyNodeName,
    ReservedNodeName(String),
    UnknownEdgeSource(String),
    MissingOutgoingEdge(String),
    UnmappedRouteLabel { node: String, label: String },
    TerminalUnreachable,
    UnreachableNodes(Vec<String>),
}

impl fmt::Display for InvalidRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidRule::MissingEntryPoint => write!(f, "no entry point set"),
            InvalidRule::UnknownEntryPoint(name) => {
                write!(f, "entry point '{}' is not a registered node", name)
            }
            InvalidRule::EmptyNodeName => write!(f, "node names must not be empty"),
            InvalidRule::ReservedNodeName(name) => {
                write!(f, "'{}' is reserved and cannot name a node", name)
            }
            InvalidRule::UnknownEdgeSource(name) => {
                write!(f, "edge source '{}' is not a registered node", name)
            }
            InvalidRule::MissingOutgoingEdge(name) => {
                write!(f, "node '{}' has no outgoing edge", name)
            }
            InvalidRule::UnmappedRouteLabel { node, label } => write!(
                f,
                "router on '{}' can return '{}' but the label is not mapped",
                node, label
            ),
            InvalidRule::TerminalUnreachable => {
                write!(f, "END is not reachable from the entry point")
            }
            InvalidRule::UnreachableNodes(nodes) => {
                write!(f, "unreachable nodes: {}", nodes.join(", "))
            }
        }
    }
}

impl GraphError {
    pub(crate) fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that can only come out of a running execution
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            GraphError::UnroutableLabel { .. }
                | GraphError::NodeExecution { .. }
                | GraphError::StepLimitExceeded { .. }
                | GraphError::SchemaViolation { .. }
        )
    }
}

/// A failed execution: the error plus where it happened
#[derive(Debug, Error)]
#[error("Execution {execution_id} failed at node '{node}' after {step} steps: {error}")]
pub struct ExecutionError {
    pub execution_id: Uuid,
    pub node: String,
    pub step: usize,
    /// Last committed state before the failure
    pub state: WorkflowState,
    #[source]
    pub error: GraphError,
}

/// Source error used when a node exceeds `RunConfig::node_timeout`
#[derive(Debug, Error)]
#[error("node timed out after {after:?}")]
pub struct NodeTimeout {
    pub after: Duration,
}

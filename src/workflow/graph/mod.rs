// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! Build a [`StateGraph`] from nodes and edges, compile it into an immutable
//! [`CompiledGraph`], then run any number of independent executions.

mod compiler;
mod edge;
pub mod executor;
mod node;
mod state_graph;
pub mod trace;

pub use compiler::{
    CompileOptions, CompiledGraph, Diagnostic, EdgeSummary, PlanSummary, UnreachablePolicy,
    DEFAULT_MAX_STEPS,
};
pub use edge::{router_fn, Destination, Edge, FnRouter, Router, END, START};
pub use executor::{
    Execution, ExecutionEvent, ExecutionOutcome, ExecutionStatus, RunConfig, StepRecord,
};
pub use node::{node_async, node_fn, AsyncFnNode, FnNode, Node, StaticNode};
pub use state_graph::StateGraph;
pub use trace::{ExecutionTrace, TraceEntry};

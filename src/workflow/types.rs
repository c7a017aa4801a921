// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definitions
//!
//! A definition names its state schema, its nodes and their outgoing edges.
//! [`crate::workflow::builder::Builder`] turns it into a compiled graph.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::Temperature;
use crate::workflow::state::StateSchema;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Step ceiling for executions; falls back to the configured default
    pub max_steps: Option<usize>,
    /// Node every execution starts at
    pub entry: String,
    #[serde(default)]
    pub state: StateSchema,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// A node in a graph workflow
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDefinition {
    /// Unique node identifier
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    /// A callable registered in the handler registry under this name
    Handler { handler: String },
    /// A model call
    Llm(LlmDefinition),
    /// Writes fixed values
    Set { values: Map<String, Value> },
    /// Nearest-document lookup over an embedded corpus
    Retrieve(RetrieveDefinition),
}

/// Model call configuration for `kind: llm` nodes
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmDefinition {
    /// Prompt template, e.g. `"Answer briefly: {question}"`
    pub prompt: String,
    pub system: Option<String>,
    #[serde(default = "default_output")]
    pub output: String,
    /// Append-reduced field receiving `Q:` / `A:` lines
    pub transcript: Option<String>,
    /// Model name, or the `primary` / `alternative` alias
    pub model: Option<String>,
    pub temperature: Option<TemperatureSetting>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub stream: bool,
    pub history: Option<HistoryDefinition>,
}

fn default_output() -> String {
    "output".to_string()
}

/// A preset name (`creative`, `balanced`, `precise`) or a plain number
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(untagged)]
pub enum TemperatureSetting {
    Preset(Temperature),
    Value(f32),
}

impl TemperatureSetting {
    pub fn value(self) -> f32 {
        match self {
            TemperatureSetting::Preset(preset) => preset.value(),
            TemperatureSetting::Value(value) => value,
        }
    }
}

/// Document lookup for `kind: retrieve` nodes
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrieveDefinition {
    /// Query template, e.g. `"{question}"`
    pub query: String,
    /// Corpus, embedded on first use
    pub documents: Vec<String>,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Field receiving the matching texts, best first
    #[serde(default = "default_context")]
    pub output: String,
}

fn default_k() -> usize {
    3
}

fn default_context() -> String {
    "context".to_string()
}

/// Session memory for a `kind: llm` node
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryDefinition {
    /// State field holding the session id
    pub session_field: String,
    /// Number of past messages sent along; all when absent
    pub window: Option<usize>,
}

/// Outgoing edge of one node
///
/// Exactly one of `to`, `routes` or `route_on` must be set.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EdgeDefinition {
    pub from: String,
    /// Unconditional destination (a node id or `END`)
    pub to: Option<String>,
    /// Ordered condition branches
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
    /// Route on the value of this state field, through `map`
    pub route_on: Option<String>,
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

/// One branch of a conditional edge
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RouteDefinition {
    /// Condition expression; a branch without one is the fallback
    pub when: Option<String>,
    /// Label for the branch; defaults to the destination
    pub label: Option<String>,
    pub to: String,
}

impl RouteDefinition {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.to)
    }
}

// SPDX-License-Identifier: MIT

//! kinetic-flow: a declarative state-graph workflow engine
//!
//! - [`workflow`] holds the engine: state schema and reducers, nodes and
//!   edges, the compiler and the executor, plus YAML definitions.
//! - [`adk`] holds the collaborators nodes talk to: chat models, embeddings
//!   and conversation history.
//! - [`tools`] holds built-in handlers for `kind: handler` nodes.

pub mod adk;
pub mod config;
pub mod tools;
pub mod workflow;

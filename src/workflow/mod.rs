// SPDX-License-Identifier: MIT

pub mod builder;
pub mod condition;
pub mod error;
pub mod graph;
pub mod llm;
pub mod loader;
pub mod registry;
pub mod retrieve;
pub mod state;
pub mod template;
pub mod types;

pub use error::{ExecutionError, GraphError, InvalidRule};
pub use graph::{CompiledGraph, StateGraph, END, START};
pub use state::{StateSchema, StateUpdate, WorkflowState};

// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - defines the shape, types and reducers of workflow state
//! - `WorkflowState` - the immutable state value threaded through a run
//! - `StateUpdate` - the partial update a node returns

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateField, StateFieldDef, StateSchema};
pub use store::{StateUpdate, WorkflowState};

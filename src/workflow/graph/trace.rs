// SPDX-License-Identifier: MIT

//! Per-step execution records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::workflow::state::StateUpdate;

/// Ordered record of every node invocation of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub execution_id: Uuid,
    pub entries: Vec<TraceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: usize,
    pub node: String,
    pub update: StateUpdate,
    /// State after the update was merged
    pub state: Value,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionTrace {
    pub fn new(execution_id: Uuid) -> Self {
        Self {
            execution_id,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Node names in invocation order
    pub fn path(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.node.as_str()).collect()
    }
}

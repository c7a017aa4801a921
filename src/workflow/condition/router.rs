// SPDX-License-Identifier: MIT

//! Routers built from state data rather than Rust closures

use std::collections::BTreeSet;

use super::{evaluate, parse, ConditionError, Expression};
use crate::workflow::graph::Router;
use crate::workflow::state::WorkflowState;

/// Label returned when no branch matches and there is no fallback
///
/// It is never a valid key of a label map, so the executor reports it as an
/// unroutable label.
pub const UNMATCHED: &str = "__unmatched__";

/// Ordered `when` branches; the first matching branch names the label
#[derive(Debug, Clone, Default)]
pub struct ConditionRouter {
    branches: Vec<(Expression, String)>,
    otherwise: Option<String>,
}

impl ConditionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a branch taken when `condition` holds
    pub fn when(mut self, condition: &str, label: impl Into<String>) -> Result<Self, ConditionError> {
        self.branches.push((parse(condition)?, label.into()));
        Ok(self)
    }

    /// Label used when no branch matches
    pub fn otherwise(mut self, label: impl Into<String>) -> Self {
        self.otherwise = Some(label.into());
        self
    }
}

impl Router for ConditionRouter {
    fn route(&self, state: &WorkflowState) -> String {
        self.branches
            .iter()
            .find(|(expr, _)| evaluate(expr, state))
            .map(|(_, label)| label.clone())
            .or_else(|| self.otherwise.clone())
            .unwrap_or_else(|| UNMATCHED.to_string())
    }

    fn labels(&self) -> Option<Vec<String>> {
        let labels: BTreeSet<String> = self
            .branches
            .iter()
            .map(|(_, l)| l.clone())
            .chain(self.otherwise.iter().cloned())
            .collect();
        Some(labels.into_iter().collect())
    }
}

/// Routes on the string value of a state field
///
/// Numbers and booleans are routed by their JSON text; a missing field routes
/// to [`UNMATCHED`].
#[derive(Debug, Clone)]
pub struct FieldRouter {
    field: String,
}

impl FieldRouter {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Router for FieldRouter {
    fn route(&self, state: &WorkflowState) -> String {
        match state.get_path(&self.field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => UNMATCHED.to_string(),
            Some(other) => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::{FieldType, StateFieldDef, StateSchema, StateUpdate};

    fn state(count: i64, decision: Option<&str>) -> WorkflowState {
        let schema = StateSchema::new()
            .field("count", StateFieldDef::new(FieldType::Integer))
            .field("decision", StateFieldDef::new(FieldType::String));
        let mut update = StateUpdate::new().set("count", count);
        if let Some(d) = decision {
            update.insert("decision", d);
        }
        WorkflowState::new(schema).merge(&update).unwrap()
    }

    #[test]
    fn test_first_matching_branch_wins() {
        let router = ConditionRouter::new()
            .when("count < 3", "low")
            .unwrap()
            .when("count < 10", "mid")
            .unwrap()
            .otherwise("high");

        assert_eq!(router.route(&state(1, None)), "low");
        assert_eq!(router.route(&state(5, None)), "mid");
        assert_eq!(router.route(&state(50, None)), "high");
    }

    #[test]
    fn test_no_match_without_otherwise() {
        let router = ConditionRouter::new().when("count < 3", "low").unwrap();
        assert_eq!(router.route(&state(7, None)), UNMATCHED);
    }

    #[test]
    fn test_declared_labels() {
        let router = ConditionRouter::new()
            .when("count < 5", "continue")
            .unwrap()
            .otherwise("end");
        assert_eq!(
            router.labels(),
            Some(vec!["continue".to_string(), "end".to_string()])
        );
    }

    #[test]
    fn test_declared_labels_are_unique() {
        let router = ConditionRouter::new()
            .when("count > 5", "x")
            .unwrap()
            .when("count > 2", "y")
            .unwrap()
            .otherwise("x");
        assert_eq!(
            router.labels(),
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn test_bad_condition_is_rejected() {
        assert!(ConditionRouter::new().when("count <", "x").is_err());
    }

    #[test]
    fn test_field_router() {
        let router = FieldRouter::new("decision");
        assert_eq!(router.route(&state(0, Some("approve"))), "approve");
        assert_eq!(router.route(&state(0, None)), UNMATCHED);
        assert_eq!(FieldRouter::new("count").route(&state(4, None)), "4");
        assert!(router.labels().is_none());
    }
}

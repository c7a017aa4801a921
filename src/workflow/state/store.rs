// SPDX-License-Identifier: MIT

//! Runtime state values and the reducer-driven merge

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::schema::{FieldType, ReducerType, StateSchema};
use crate::workflow::error::GraphError;

/// Workflow data at one point in time
///
/// A state is never mutated once built: [`WorkflowState::merge`] returns a new
/// value. Cloning is cheap for the schema (shared) and deep for the values.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    schema: Arc<StateSchema>,
    fields: BTreeMap<String, Value>,
}

/// A partial update produced by a node: only the fields it changes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateUpdate(Map<String, Value>);

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for StateUpdate {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for StateUpdate {
    type Error = GraphError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(GraphError::schema(
                "<update>",
                format!("an update must be a JSON object, got {}", other),
            )),
        }
    }
}

impl WorkflowState {
    /// Create a state holding only the schema defaults
    pub fn new(schema: impl Into<Arc<StateSchema>>) -> Self {
        let schema = schema.into();
        let fields = schema
            .fields()
            .filter_map(|f| f.def.default.clone().map(|d| (f.name.clone(), d)))
            .collect();

        Self { schema, fields }
    }

    /// Build the initial state of an execution from caller-supplied JSON
    ///
    /// Every key must be declared and well typed. Missing fields take their
    /// defaults. Values are taken as-is, reducers do not apply.
    pub fn from_json(schema: impl Into<Arc<StateSchema>>, value: Value) -> Result<Self, GraphError> {
        let mut state = Self::new(schema);
        let map = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(GraphError::schema(
                    "<initial>",
                    format!("the initial state must be a JSON object, got {}", other),
                ))
            }
        };

        for (key, value) in map {
            let field_type = state.field_type(&key)?;
            check_type(&key, field_type, &value)?;
            state.fields.insert(key, value);
        }

        Ok(state)
    }

    /// Apply a partial update through the schema's reducers
    pub fn merge(&self, update: &StateUpdate) -> Result<WorkflowState, GraphError> {
        let mut fields = self.fields.clone();

        for (key, value) in update.iter() {
            let def = self
                .schema
                .get(key)
                .ok_or_else(|| GraphError::schema(key, "field is not declared in the schema"))?;

            let merged = match def.reducer {
                ReducerType::Overwrite => {
                    check_type(key, def.field_type, value)?;
                    value.clone()
                }
                ReducerType::Append => append(key, fields.get(key), value)?,
                ReducerType::Max => pick_number(key, def.field_type, fields.get(key), value, |a, b| b > a)?,
                ReducerType::Min => pick_number(key, def.field_type, fields.get(key), value, |a, b| b < a)?,
                ReducerType::Merge => merge_object(key, fields.get(key), value)?,
            };

            fields.insert(key.clone(), merged);
        }

        Ok(Self {
            schema: Arc::clone(&self.schema),
            fields,
        })
    }

    fn field_type(&self, key: &str) -> Result<FieldType, GraphError> {
        self.schema
            .get(key)
            .map(|def| def.field_type)
            .ok_or_else(|| GraphError::schema(key, "field is not declared in the schema"))
    }

    /// The schema this state was built against
    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a nested field value using dot notation (e.g., "result.intent")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }

    /// Convert state to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Names of the fields that currently hold a value
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

impl PartialEq for WorkflowState {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Serialize for WorkflowState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

fn check_type(key: &str, field_type: FieldType, value: &Value) -> Result<(), GraphError> {
    if field_type.accepts(value) {
        Ok(())
    } else {
        Err(GraphError::schema(
            key,
            format!("expected {}, got {}", field_type, value),
        ))
    }
}

fn append(key: &str, current: Option<&Value>, value: &Value) -> Result<Value, GraphError> {
    let mut items = match current {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => {
            return Err(GraphError::schema(
                key,
                format!("cannot append to non-array value {}", other),
            ))
        }
    };

    match value {
        Value::Array(new_items) => items.extend(new_items.iter().cloned()),
        other => items.push(other.clone()),
    }

    Ok(Value::Array(items))
}

fn pick_number<F>(
    key: &str,
    field_type: FieldType,
    current: Option<&Value>,
    value: &Value,
    replace: F,
) -> Result<Value, GraphError>
where
    F: Fn(f64, f64) -> bool,
{
    check_type(key, field_type, value)?;
    let new = value
        .as_f64()
        .ok_or_else(|| GraphError::schema(key, format!("expected a number, got {}", value)))?;

    match current.and_then(Value::as_f64) {
        Some(old) if !replace(old, new) => Ok(current.cloned().unwrap_or(Value::Null)),
        _ => Ok(value.clone()),
    }
}

fn merge_object(key: &str, current: Option<&Value>, value: &Value) -> Result<Value, GraphError> {
    let new_obj = value
        .as_object()
        .ok_or_else(|| GraphError::schema(key, format!("expected object, got {}", value)))?;

    let mut merged = match current {
        Some(Value::Object(obj)) => obj.clone(),
        _ => Map::new(),
    };
    for (k, v) in new_obj {
        merged.insert(k.clone(), v.clone());
    }

    Ok(Value::Object(merged))
}

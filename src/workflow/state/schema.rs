// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::workflow::error::GraphError;

/// Schema defining the workflow state structure
///
/// Fields keep the order they were declared in, both when built in code and
/// when read from YAML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSchema {
    fields: Vec<StateField>,
}

/// A named field of a [`StateSchema`]
#[derive(Debug, Clone, PartialEq)]
pub struct StateField {
    pub name: String,
    pub def: StateFieldDef,
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StateFieldDef {
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

/// Reducer types for merging values into state
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    #[serde(alias = "replace")]
    Overwrite,
    /// Append to array
    Append,
    /// Keep maximum value
    Max,
    /// Keep minimum value
    Min,
    /// Shallow-merge objects
    Merge,
}

impl FieldType {
    /// Check whether a JSON value is acceptable for this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        };
        f.write_str(name)
    }
}

impl StateFieldDef {
    /// A field of the given type with the overwrite reducer and no default
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            reducer: ReducerType::Overwrite,
            default: None,
        }
    }

    pub fn reducer(mut self, reducer: ReducerType) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field, replacing any earlier declaration with the same name
    pub fn field(mut self, name: impl Into<String>, def: StateFieldDef) -> Self {
        self.insert(name, def);
        self
    }

    /// Declare a field in place
    pub fn insert(&mut self, name: impl Into<String>, def: StateFieldDef) {
        let name = name.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.def = def,
            None => self.fields.push(StateField { name, def }),
        }
    }

    /// Look up a field definition
    pub fn get(&self, name: &str) -> Option<&StateFieldDef> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.def)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &StateField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that reducers fit their field types and defaults fit the schema
    pub fn validate(&self) -> Result<(), GraphError> {
        for StateField { name, def } in &self.fields {
            let reducer_fits = match def.reducer {
                ReducerType::Overwrite => true,
                ReducerType::Append => {
                    matches!(def.field_type, FieldType::Array | FieldType::Any)
                }
                ReducerType::Max | ReducerType::Min => {
                    matches!(def.field_type, FieldType::Number | FieldType::Integer)
                }
                ReducerType::Merge => {
                    matches!(def.field_type, FieldType::Object | FieldType::Any)
                }
            };
            if !reducer_fits {
                return Err(GraphError::schema(
                    name,
                    format!(
                        "reducer {:?} cannot be used on a field of type {}",
                        def.reducer, def.field_type
                    ),
                ));
            }

            if let Some(default) = &def.default {
                if !def.field_type.accepts(default) {
                    return Err(GraphError::schema(
                        name,
                        format!("default {} is not of type {}", default, def.field_type),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Serialize for StateSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.name, &field.def)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StateSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = StateSchema;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field names to field definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StateSchema, A::Error> {
                let mut schema = StateSchema::new();
                while let Some((name, def)) = access.next_entry::<String, StateFieldDef>()? {
                    if schema.contains(&name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate state field '{}'",
                            name
                        )));
                    }
                    schema.insert(name, def);
                }
                Ok(schema)
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

// SPDX-License-Identifier: MIT

//! Typed error handling for kinetic-flow
//!
//! Collaborator errors (model, embedding) live here together with the
//! top-level `FlowError` used while loading and building workflows.
//! Engine errors live in `crate::workflow::error`.

use std::time::Duration;
use thiserror::Error;

use crate::workflow::condition::ConditionError;
use crate::workflow::error::GraphError;

/// Error type returned by node callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for kinetic-flow
#[derive(Debug, Error)]
pub enum FlowError {
    /// Graph construction, compilation or execution errors
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Condition expression could not be parsed
    #[error("Condition error: {0}")]
    Condition(#[from] ConditionError),

    /// Model collaborator errors
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Embedding collaborator errors
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// A `kind: handler` node names a handler nobody registered
    #[error("Handler '{name}' not found")]
    HandlerNotFound { name: String },

    /// Configuration errors (invalid env vars, missing model)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structurally invalid workflow definition
    #[error("Invalid workflow definition: {0}")]
    Definition(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Model/LLM collaborator errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// The backing service could not be reached
    #[error("Model service unavailable at {endpoint}: {message}")]
    Unavailable { endpoint: String, message: String },

    /// The request deadline passed before a response arrived
    #[error("Model request timed out after {after:?}")]
    Timeout { after: Duration },

    /// Generation options out of range
    #[error("Invalid generation config: {0}")]
    InvalidConfig(String),

    /// The service answered with something we cannot decode
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Non-success HTTP status
    #[error("Model service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

/// Embedding collaborator errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding service could not be reached
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with something we cannot decode
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    /// Vector length does not match the index dimension
    #[error("Expected a vector of dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl FlowError {
    /// Create a handler not found error
    pub fn handler_not_found(name: impl Into<String>) -> Self {
        Self::HandlerNotFound { name: name.into() }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a definition error
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }
}

impl ModelError {
    /// Map a transport error from reqwest onto the collaborator taxonomy
    pub(crate) fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout { after: timeout }
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Unavailable {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

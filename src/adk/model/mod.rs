// SPDX-License-Identifier: MIT

//! Model module - defines the chat model trait and shared types
//!
//! Implementations live in their own submodules:
//! - [ollama] - a locally hosted Ollama-compatible server

pub mod ollama;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::adk::error::ModelError;

pub use ollama::OllamaModel;

/// Ordered, finite stream of text chunks from one generation
///
/// The stream is consumed once; it cannot be restarted.
pub type ChunkStream = BoxStream<'static, Result<String, ModelError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationConfig {
    /// Overrides the client's default model name
    pub model: Option<String>,
    pub temperature: Option<f32>,
    #[serde(with = "opt_secs", default)]
    pub timeout: Option<Duration>,
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reject options outside the supported ranges
    pub fn validate(&self) -> Result<(), ModelError> {
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ModelError::InvalidConfig(format!(
                    "temperature {} is outside [0, 1]",
                    t
                )));
            }
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(ModelError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ModelError::InvalidConfig("model name is empty".to_string()));
        }
        Ok(())
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.filter(|s| *s >= 0.0).map(Duration::from_secs_f64))
    }
}

/// Core trait for chat model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Name of the default model this client talks to
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<String, ModelError>;

    /// Stream the completion chunk by chunk
    ///
    /// The default yields the full completion as a single chunk.
    async fn stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ChunkStream, ModelError> {
        let text = self.complete(messages, config).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// One model's answer in a comparison run
#[derive(Debug)]
pub struct Comparison {
    pub model: String,
    pub result: Result<String, ModelError>,
}

/// Send the same messages to each named model in turn
///
/// A failing model does not stop the run; its error is kept in its entry.
pub async fn compare_models(
    client: &dyn Model,
    models: &[String],
    messages: &[Message],
    config: &GenerationConfig,
) -> Vec<Comparison> {
    let mut results = Vec::with_capacity(models.len());
    for name in models {
        let config = config.clone().with_model(name.clone());
        let result = client.complete(messages, &config).await;
        if let Err(err) = &result {
            log::warn!("Model '{}' failed: {}", name, err);
        }
        results.push(Comparison {
            model: name.clone(),
            result,
        });
    }
    results
}

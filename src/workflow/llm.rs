// SPDX-License-Identifier: MIT

//! Model-backed node
//!
//! Renders a prompt from state, asks a [`Model`], and writes the answer back
//! into a state field.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::Value;
use std::sync::Arc;

use crate::adk::error::BoxError;
use crate::adk::history::HistoryStore;
use crate::adk::model::{GenerationConfig, Message, Model};
use crate::workflow::graph::Node;
use crate::workflow::state::{StateUpdate, WorkflowState};
use crate::workflow::template::render_template;

/// Binds an [`LlmNode`] to a conversation history store
#[derive(Clone)]
pub struct HistoryBinding {
    pub store: Arc<dyn HistoryStore>,
    /// State field holding the session id
    pub session_field: String,
    /// Number of past messages sent with the prompt; `None` sends all
    pub window: Option<usize>,
}

/// A node that calls a chat model
pub struct LlmNode {
    model: Arc<dyn Model>,
    prompt: String,
    system: Option<String>,
    output: String,
    transcript: Option<String>,
    config: GenerationConfig,
    stream: bool,
    history: Option<HistoryBinding>,
}

impl LlmNode {
    /// `prompt` is a template rendered against the current state
    pub fn new(model: Arc<dyn Model>, prompt: impl Into<String>) -> Self {
        Self {
            model,
            prompt: prompt.into(),
            system: None,
            output: "output".to_string(),
            transcript: None,
            config: GenerationConfig::default(),
            stream: false,
            history: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Field that receives the answer (default `output`)
    pub fn output(mut self, field: impl Into<String>) -> Self {
        self.output = field.into();
        self
    }

    /// Append-reduced field that receives `Q:` / `A:` lines
    pub fn transcript(mut self, field: impl Into<String>) -> Self {
        self.transcript = Some(field.into());
        self
    }

    pub fn config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Consume the model's chunk stream instead of a single completion
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn history(mut self, binding: HistoryBinding) -> Self {
        self.history = Some(binding);
        self
    }

    fn session_id(&self, binding: &HistoryBinding, state: &WorkflowState) -> Option<String> {
        match state.get_path(&binding.session_field) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

#[async_trait]
impl Node for LlmNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        let prompt = render_template(&self.prompt, state);

        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(Message::system(render_template(system, state)));
        }

        let session = self
            .history
            .as_ref()
            .and_then(|binding| self.session_id(binding, state).map(|id| (binding, id)));

        if let Some((binding, id)) = &session {
            let past = match binding.window {
                Some(n) => binding.store.read_window(id, n).await,
                None => binding.store.read(id).await,
            };
            log::debug!("Session '{}': sending {} past messages", id, past.len());
            messages.extend(past);
        }
        messages.push(Message::user(prompt.clone()));

        let answer = if self.stream {
            let mut chunks = self.model.stream(&messages, &self.config).await?;
            let mut answer = String::new();
            while let Some(chunk) = chunks.try_next().await? {
                log::debug!("Received chunk of {} bytes", chunk.len());
                answer.push_str(&chunk);
            }
            answer
        } else {
            self.model.complete(&messages, &self.config).await?
        };

        if let Some((binding, id)) = &session {
            binding.store.append(id, Message::user(prompt.clone())).await;
            binding
                .store
                .append(id, Message::assistant(answer.clone()))
                .await;
        }

        let mut update = StateUpdate::new();
        if let Some(field) = &self.transcript {
            update.insert(
                field.clone(),
                Value::Array(vec![
                    Value::String(format!("Q: {}", prompt)),
                    Value::String(format!("A: {}", answer)),
                ]),
            );
        }
        update.insert(self.output.clone(), answer);
        Ok(update)
    }
}

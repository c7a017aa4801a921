// SPDX-License-Identifier: MIT

//! Retrieval node
//!
//! Embeds a fixed corpus on first use, then writes the documents nearest to
//! a query rendered from state.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::adk::embedding::{Embedder, VectorIndex};
use crate::adk::error::BoxError;
use crate::workflow::graph::Node;
use crate::workflow::state::{StateUpdate, WorkflowState};
use crate::workflow::template::render_template;

/// A node that looks up the `k` documents closest to a query
pub struct RetrieveNode {
    embedder: Arc<dyn Embedder>,
    documents: Vec<String>,
    index: OnceCell<VectorIndex>,
    query: String,
    k: usize,
    output: String,
}

impl RetrieveNode {
    /// `query` is a template rendered against the current state
    pub fn new(
        embedder: Arc<dyn Embedder>,
        documents: Vec<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            documents,
            index: OnceCell::new(),
            query: query.into(),
            k: 3,
            output: "context".to_string(),
        }
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Field that receives the matching texts (default `context`)
    pub fn output(mut self, field: impl Into<String>) -> Self {
        self.output = field.into();
        self
    }

    async fn index(&self) -> Result<&VectorIndex, BoxError> {
        let index = self
            .index
            .get_or_try_init(|| async {
                log::debug!("Embedding {} documents", self.documents.len());
                VectorIndex::from_texts(self.embedder.as_ref(), self.documents.iter().cloned())
                    .await
            })
            .await?;
        Ok(index)
    }
}

#[async_trait]
impl Node for RetrieveNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        let query = render_template(&self.query, state);
        let hits = self
            .index()
            .await?
            .search(self.embedder.as_ref(), &query, self.k)
            .await?;
        log::debug!("Retrieved {} documents for '{}'", hits.len(), query);

        let texts: Vec<Value> = hits.into_iter().map(|hit| Value::String(hit.text)).collect();
        Ok(StateUpdate::new().set(self.output.clone(), Value::Array(texts)))
    }
}

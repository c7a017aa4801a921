// SPDX-License-Identifier: MIT

//! Embedding collaborator and a small in-memory vector index

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::adk::error::EmbeddingError;
use crate::adk::model::ollama::DEFAULT_BASE_URL;

/// Turns text into a fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Embedder backed by Ollama's `/api/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    model_name: String,
    base_url: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model_name: model_name.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = json!({ "model": self.model_name, "prompt": text });

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("{}: {}", url, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unavailable(format!(
                "{} returned {}: {}",
                url, status, text
            )));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        parse_embedding(&value)
    }
}

fn parse_embedding(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    value["embedding"]
        .as_array()
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing 'embedding' array".to_string()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingError::InvalidResponse(format!("non-numeric value {}", v)))
        })
        .collect()
}

/// A stored document and its vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A query hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Fixed-dimension, in-memory nearest-neighbour index
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    documents: Vec<Document>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: Vec::new(),
        }
    }

    /// Embed every text in order, ids `doc-0`, `doc-1`, ...
    ///
    /// The first vector fixes the dimension.
    pub async fn from_texts<I, S>(embedder: &dyn Embedder, texts: I) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index: Option<VectorIndex> = None;
        for (i, text) in texts.into_iter().enumerate() {
            let text = text.into();
            let vector = embedder.embed(&text).await?;
            let dimension = vector.len();
            index
                .get_or_insert_with(|| VectorIndex::new(dimension))
                .insert(format!("doc-{}", i), text, vector)?;
        }
        Ok(index.unwrap_or_else(|| VectorIndex::new(0)))
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn insert(
        &mut self,
        id: impl Into<String>,
        text: impl Into<String>,
        vector: Vec<f32>,
    ) -> Result<(), EmbeddingError> {
        self.check_dimension(&vector)?;
        self.documents.push(Document {
            id: id.into(),
            text: text.into(),
            vector,
        });
        Ok(())
    }

    /// The `k` documents closest to `vector` by cosine similarity
    ///
    /// Equal scores keep insertion order.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>, EmbeddingError> {
        self.check_dimension(vector)?;

        let mut scored: Vec<ScoredDocument> = self
            .documents
            .iter()
            .map(|doc| ScoredDocument {
                id: doc.id.clone(),
                text: doc.text.clone(),
                score: cosine_similarity(vector, &doc.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Embed `text` and store it
    pub async fn add_text(
        &mut self,
        embedder: &dyn Embedder,
        id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), EmbeddingError> {
        let text = text.into();
        let vector = embedder.embed(&text).await?;
        self.insert(id, text, vector)
    }

    /// Embed `query` and return the `k` nearest documents
    pub async fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, EmbeddingError> {
        let vector = embedder.embed(query).await?;
        self.query(&vector, k)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

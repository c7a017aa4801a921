// SPDX-License-Identifier: MIT

//! Conversation history store
//!
//! Histories are keyed by opaque session ids and never shared between
//! sessions. Stores are passed to whoever needs them; there is no global.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::adk::model::Message;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, session: &str, message: Message);

    /// Full history of a session, oldest first
    async fn read(&self, session: &str) -> Vec<Message>;

    /// The last `n` messages of a session
    async fn read_window(&self, session: &str, n: usize) -> Vec<Message> {
        let messages = self.read(session).await;
        let skip = messages.len().saturating_sub(n);
        messages.into_iter().skip(skip).collect()
    }
}

/// History kept in process memory
///
/// Clones share the same underlying data.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every session with at least one message, sorted
    pub async fn sessions(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop one session's history
    pub async fn clear(&self, session: &str) {
        self.sessions.write().await.remove(session);
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, session: &str, message: Message) {
        log::debug!("History '{}': appending {} message", session, message.role);
        self.sessions
            .write()
            .await
            .entry(session.to_string())
            .or_default()
            .push(message);
    }

    async fn read(&self, session: &str) -> Vec<Message> {
        self.sessions
            .read()
            .await
            .get(session)
            .cloned()
            .unwrap_or_default()
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::quote_request::{ConversationId, QuoteRequest};

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Owns every in-progress quote request, keyed by conversation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &ConversationId) -> Result<Option<QuoteRequest>, SessionStoreError>;
    async fn put(&self, id: &ConversationId, request: QuoteRequest)
        -> Result<(), SessionStoreError>;
    async fn delete(&self, id: &ConversationId) -> Result<(), SessionStoreError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<ConversationId, QuoteRequest>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &ConversationId) -> Result<Option<QuoteRequest>, SessionStoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn put(
        &self,
        id: &ConversationId,
        request: QuoteRequest,
    ) -> Result<(), SessionStoreError> {
        self.sessions.write().await.insert(id.clone(), request);
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<(), SessionStoreError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}

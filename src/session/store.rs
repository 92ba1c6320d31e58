//! Session metadata store collaborator.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::tools::ToolConfig;
use crate::types::HistoryMessage;

/// Persisted view of one conversation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default)]
    pub tool_config: ToolConfig,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    /// Whether completed exchanges are appended to `history`.
    #[serde(default)]
    pub persist_history: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, model_id: Option<String>, tool_config: ToolConfig) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            model_id,
            tool_config,
            history: Vec::new(),
            persist_history: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Key-value store for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    async fn put(&self, record: SessionRecord) -> Result<()>;

    /// Remove a record; returns whether it existed.
    async fn delete(&self, session_id: &str) -> Result<bool>;
}

/// Process-local [`SessionStore`].
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.records.read().await.get(session_id).cloned())
    }

    async fn put(&self, record: SessionRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(session_id).is_some())
    }
}

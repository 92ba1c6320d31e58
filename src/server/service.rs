//! Chat and session operations behind the wire protocol.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use super::request::ChatRequest;
use crate::agent_loop::{RunCoordinator, RunEvent, RunRequest, RunStream, NO_USER_MESSAGE};
use crate::config::AiboxConfig;
use crate::error::{AiboxError, Result};
use crate::protocol::encode_stream;
use crate::provider::ProviderRegistry;
use crate::session::{spawn_sweeper, SessionAgentCache, SessionRecord, SessionStore, SweeperHandle};
use crate::tools::{ToolCatalog, ToolConfig, ToolResolver};
use crate::types::HistoryMessage;

/// Event stream of one chat request.
pub type ChatStream = BoxStream<'static, RunEvent>;

/// Encoded `data:` frames of one chat request.
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Server-side facade: the chat endpoint plus session management.
#[derive(Clone)]
pub struct AgentService {
    coordinator: RunCoordinator,
    store: Arc<dyn SessionStore>,
}

impl AgentService {
    pub fn new(
        config: AiboxConfig,
        registry: Arc<ProviderRegistry>,
        resolver: Arc<ToolResolver>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let cache = SessionAgentCache::new(registry, resolver, config);
        Self::from_parts(RunCoordinator::new(cache), store)
    }

    pub fn from_parts(coordinator: RunCoordinator, store: Arc<dyn SessionStore>) -> Self {
        Self { coordinator, store }
    }

    pub fn coordinator(&self) -> &RunCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &SessionAgentCache {
        self.coordinator.cache()
    }

    fn config(&self) -> &AiboxConfig {
        self.cache().config()
    }

    /// Start the background TTL sweep for this service's cache.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        spawn_sweeper(self.cache().clone(), self.config().sweep_interval())
    }

    /// Run one chat turn.
    ///
    /// Model precedence: request, then session record, then configured
    /// default. A completed exchange is appended to the stored history when
    /// the session has `persist_history` on.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatStream> {
        if request.session_id.is_empty() {
            return Err(AiboxError::InvalidArgument("session id is required".into()));
        }
        let Some(chat) = request.normalize() else {
            tracing::warn!(session_id = %request.session_id, "chat request without a user message");
            return Ok(Box::pin(RunStream::rejected(NO_USER_MESSAGE)));
        };
        let mut record = self.get_session(&request.session_id).await?;
        let model_id = request
            .model_id
            .clone()
            .or_else(|| record.model_id.clone())
            .or_else(|| self.config().default_model.clone())
            .ok_or_else(|| {
                AiboxError::Configuration(format!(
                    "no model selected for session {}",
                    request.session_id
                ))
            })?;
        let tool_config = request
            .tool_config
            .clone()
            .unwrap_or_else(|| record.tool_config.clone());

        if record.model_id.as_deref() != Some(model_id.as_str()) {
            record.model_id = Some(model_id.clone());
            record.touch();
            self.store.put(record).await?;
        }

        let prompt = chat.prompt;
        let run_request = RunRequest::builder()
            .session_id(request.session_id.clone())
            .model_id(model_id)
            .prompt(prompt.clone())
            .attachments(chat.attachments)
            .history(chat.history)
            .tool_config(tool_config)
            .build();
        let run = self.coordinator.run(run_request).await?;

        let store = self.store.clone();
        let session_id = request.session_id;
        Ok(Box::pin(async_stream::stream! {
            let mut run: RunStream = run;
            while let Some(event) = run.next().await {
                if !event.is_terminal() {
                    yield event;
                    continue;
                }
                // Consumers may stop reading at the terminal event.
                let result = run.result().await;
                if result.is_completed() {
                    if let Err(e) = record_exchange(store.as_ref(), &session_id, prompt, result.assistant_text).await {
                        tracing::warn!(session_id = %session_id, error = %e, "failed to persist chat exchange");
                    }
                }
                yield event;
                break;
            }
        }))
    }

    /// [`chat`](Self::chat) encoded as `data:` frames.
    pub async fn chat_sse(&self, request: ChatRequest) -> Result<FrameStream> {
        let events = self.chat(request).await?;
        Ok(Box::pin(encode_stream(events)))
    }

    /// Load the session record, creating it with configured defaults.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionRecord> {
        if let Some(record) = self.store.get(session_id).await? {
            return Ok(record);
        }
        let config = self.config();
        let record = SessionRecord::new(
            session_id,
            config.default_model.clone(),
            config.tools.clone(),
        );
        self.store.put(record.clone()).await?;
        tracing::debug!(session_id, "created session record");
        Ok(record)
    }

    /// Select the model for subsequent runs; the cached agent hot-swaps on
    /// its next acquire.
    pub async fn update_model(&self, session_id: &str, model_id: &str) -> Result<SessionRecord> {
        if !self.cache().registry().supports(model_id) {
            return Err(AiboxError::ModelNotFound(model_id.to_string()));
        }
        self.update_record(session_id, |record| {
            record.model_id = Some(model_id.to_string());
        })
        .await
    }

    pub async fn update_tool_config(
        &self,
        session_id: &str,
        tool_config: ToolConfig,
    ) -> Result<SessionRecord> {
        self.update_record(session_id, |record| record.tool_config = tool_config)
            .await
    }

    pub async fn set_persist_history(&self, session_id: &str, enabled: bool) -> Result<SessionRecord> {
        self.update_record(session_id, |record| record.persist_history = enabled)
            .await
    }

    /// Replace the stored history, e.g. after a client retraction.
    ///
    /// Returns the number of messages stored.
    pub async fn sync_history(&self, session_id: &str, history: Vec<HistoryMessage>) -> Result<usize> {
        let count = history.len();
        self.update_record(session_id, |record| record.history = history)
            .await?;
        tracing::debug!(session_id, messages = count, "synced session history");
        Ok(count)
    }

    /// Forget the session: stored record and cached agent.
    pub async fn clear_session(&self, session_id: &str) -> Result<bool> {
        let stored = self.store.delete(session_id).await?;
        let cached = self.cache().evict(session_id).await;
        tracing::info!(session_id, stored, cached, "cleared session");
        Ok(stored || cached)
    }

    pub fn tool_catalog(&self) -> ToolCatalog {
        self.cache().resolver().catalog()
    }

    /// Evict every cached agent, closing tool-server connections.
    pub async fn shutdown(&self) {
        self.cache().shutdown().await;
    }

    async fn update_record<F>(&self, session_id: &str, update: F) -> Result<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut record = self.get_session(session_id).await?;
        update(&mut record);
        record.touch();
        self.store.put(record.clone()).await?;
        Ok(record)
    }
}

async fn record_exchange(
    store: &dyn SessionStore,
    session_id: &str,
    prompt: String,
    reply: String,
) -> Result<()> {
    let Some(mut record) = store.get(session_id).await? else {
        return Ok(());
    };
    if !record.persist_history {
        return Ok(());
    }
    record.history.push(HistoryMessage::user(prompt));
    record.history.push(HistoryMessage::assistant(reply));
    record.touch();
    store.put(record).await
}

impl std::fmt::Debug for AgentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentService")
            .field("cache", self.cache())
            .finish()
    }
}

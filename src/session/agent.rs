//! The cached per-session agent.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::conversation::Conversation;
use crate::provider::SharedProvider;
use crate::tools::{ResolvedTools, ToolConfig};

/// One tool call executed by a run, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLogEntry {
    pub run_id: String,
    pub tool_call_id: String,
}

/// Append-only record of tool calls executed against a cache entry.
///
/// Shared between the entry and whichever run currently holds the agent, so
/// it survives agent rebuilds.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<CallLogEntry>>>,
}

impl CallLog {
    pub fn record(&self, run_id: &str, tool_call_id: &str) {
        self.lock().push(CallLogEntry {
            run_id: run_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
        });
    }

    pub fn entries(&self) -> Vec<CallLogEntry> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CallLogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// An agent bound to one model and one resolved tool set.
///
/// Not safe for concurrent runs; the cache hands it out behind an exclusive
/// lease.
pub struct SessionAgent {
    instance_id: Uuid,
    session_id: String,
    model_id: String,
    tool_config: ToolConfig,
    provider: SharedProvider,
    pub(crate) tools: ResolvedTools,
    conversation: Conversation,
    call_log: CallLog,
    built_at: DateTime<Utc>,
}

impl SessionAgent {
    pub(crate) fn new(
        session_id: &str,
        model_id: &str,
        tool_config: &ToolConfig,
        provider: SharedProvider,
        tools: ResolvedTools,
        window: usize,
        call_log: CallLog,
    ) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            model_id: model_id.to_string(),
            tool_config: tool_config.clone(),
            provider,
            tools,
            conversation: Conversation::new(window),
            call_log,
            built_at: Utc::now(),
        }
    }

    /// Identity of this agent object; changes on every rebuild.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn tool_config(&self) -> &ToolConfig {
        &self.tool_config
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn tools(&self) -> &ResolvedTools {
        &self.tools
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn call_log(&self) -> &CallLog {
        &self.call_log
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Bind a new model. Model-specific conversation state is discarded.
    pub(crate) fn swap_model(&mut self, model_id: &str, provider: SharedProvider) {
        self.model_id = model_id.to_string();
        self.provider = provider;
        self.conversation.clear();
        self.instance_id = Uuid::new_v4();
        self.built_at = Utc::now();
    }

    /// Install a new tool set, returning the previous one.
    pub(crate) fn swap_tools(&mut self, tool_config: &ToolConfig, tools: ResolvedTools) -> ResolvedTools {
        self.tool_config = tool_config.clone();
        self.instance_id = Uuid::new_v4();
        std::mem::replace(&mut self.tools, tools)
    }
}

impl std::fmt::Debug for SessionAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAgent")
            .field("instance_id", &self.instance_id)
            .field("session_id", &self.session_id)
            .field("model_id", &self.model_id)
            .field("tools", &self.tools)
            .field("messages", &self.conversation.len())
            .finish()
    }
}

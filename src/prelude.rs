//! Convenience re-exports for common use.

pub use crate::agent_loop::{RunCoordinator, RunEvent, RunRequest, RunResult, RunStatus, RunStream};
pub use crate::client::{
    AgentBackend, ChatClient, ChatThread, ClientRunReducer, HttpBackend, LocalBackend, Message,
    RunState, ThreadStore, ToolCall, ToolCallStatus,
};
pub use crate::config::{AiboxConfig, ToolServerConfig};
pub use crate::error::{AiboxError, Result};
#[cfg(feature = "mcp")]
pub use crate::mcp::McpConnector;
pub use crate::mcp::ToolServerPool;
pub use crate::protocol::{FrameDecoder, FrameEncoder};
pub use crate::provider::{ModelProvider, ProviderDelta, ProviderRegistry, ProviderRequest};
pub use crate::server::{AgentService, ChatMessage, ChatRequest};
pub use crate::session::{InMemorySessionStore, SessionAgentCache, SessionStore};
pub use crate::tools::{
    AgentTool, AgentToolParameters, LegacyToolRegistry, Tool, ToolArguments, ToolConfig, ToolResolver,
};
pub use crate::types::{Attachment, HistoryMessage, ModelMessage, Role};

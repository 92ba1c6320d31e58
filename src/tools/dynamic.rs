//! Runtime-discovered tools hosted on remote tool servers.

use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::{AgentToolParameters, ToolTier};
use crate::error::AiboxError;

/// Separator between server name and tool name in exposed tool names.
pub const REMOTE_TOOL_SEPARATOR: &str = "__";

/// A tool discovered at runtime (e.g., from an MCP server).
#[derive(Debug, Clone)]
pub struct DynamicTool {
    pub name: String,
    pub description: String,
    pub parameters: AgentToolParameters,
}

/// Trait for providers that can discover and execute tools at runtime.
#[async_trait]
pub trait DynamicToolProvider: Send + Sync {
    /// List available tools.
    async fn list_tools(&self) -> Result<Vec<DynamicTool>, AiboxError>;

    /// Execute a tool by its server-local name.
    async fn execute_tool(
        &self,
        name: &str,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, AiboxError>;
}

/// Adapter that exposes a [`DynamicTool`] through the core [`Tool`] trait.
///
/// The exposed name is `<server>__<tool>`; execution forwards the original
/// server-local name.
pub struct DynamicToolAdapter {
    provider: Arc<dyn DynamicToolProvider>,
    exposed_name: String,
    remote_name: String,
    description: String,
    parameters: AgentToolParameters,
}

impl DynamicToolAdapter {
    /// Create a new adapter for a tool discovered on `server`.
    pub fn new(server: &str, provider: Arc<dyn DynamicToolProvider>, tool: DynamicTool) -> Self {
        Self {
            provider,
            exposed_name: format!("{server}{REMOTE_TOOL_SEPARATOR}{}", tool.name),
            remote_name: tool.name,
            description: tool.description,
            parameters: tool.parameters,
        }
    }

    /// Name of the tool on its server.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }
}

#[async_trait]
impl Tool for DynamicToolAdapter {
    fn name(&self) -> &str {
        &self.exposed_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    fn tier(&self) -> ToolTier {
        ToolTier::Remote
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, AiboxError> {
        self.provider
            .execute_tool(&self.remote_name, args, ctx)
            .await
            .map_err(|e| match e {
                AiboxError::ToolExecution { .. } => e,
                other => AiboxError::tool(&self.exposed_name, other.to_string()),
            })
    }
}

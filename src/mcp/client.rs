//! rmcp-backed tool-server connections (stdio and streamable HTTP).

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParams, CallToolResult, Content, JsonObject, ProtocolVersion, ResourceContents},
    service::{ClientInitializeError, DynService, Peer, RoleClient, RunningService, ServiceError, ServiceExt},
    transport::{StreamableHttpClientTransport, TokioChildProcess},
};
use tokio::process::Command;
use tokio::sync::Mutex;

use super::pool::{ToolServerConnection, ToolServerConnector};
use crate::config::{ToolServerConfig, ToolServerTransport};
use crate::error::{AiboxError, Result};
use crate::tools::{AgentToolParameters, DynamicTool};

type DynClientService = Box<dyn DynService<RoleClient>>;
type McpRunningService = RunningService<RoleClient, DynClientService>;

/// Connector that speaks the Model Context Protocol through rmcp.
#[derive(Debug, Default, Clone)]
pub struct McpConnector;

impl McpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolServerConnector for McpConnector {
    async fn connect(
        &self,
        server: &str,
        config: &ToolServerConfig,
    ) -> Result<Arc<dyn ToolServerConnection>> {
        let client_info = rmcp::model::ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            ..Default::default()
        };

        let service = match config.transport {
            ToolServerTransport::Stdio => {
                let program = config
                    .command
                    .as_deref()
                    .ok_or_else(|| AiboxError::tool_server(server, "missing command"))?;
                let mut command = Command::new(program);
                command.args(&config.args).envs(&config.env);
                let transport = TokioChildProcess::new(command)
                    .map_err(|e| AiboxError::tool_server(server, format!("spawn failed: {e}")))?;
                client_info.into_dyn().serve(transport).await
            }
            ToolServerTransport::Http => {
                let url = config
                    .url
                    .as_deref()
                    .ok_or_else(|| AiboxError::tool_server(server, "missing url"))?;
                let transport = StreamableHttpClientTransport::from_uri(url.to_string());
                client_info.into_dyn().serve(transport).await
            }
            ToolServerTransport::Sse => {
                return Err(AiboxError::tool_server(
                    server,
                    "sse transport is not supported; use http",
                ));
            }
        }
        .map_err(|e| map_client_initialize_error(server, e))?;

        Ok(Arc::new(McpConnection::new(server, service)))
    }
}

/// One initialized MCP session.
pub struct McpConnection {
    server: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<McpRunningService>>,
}

impl McpConnection {
    fn new(server: &str, service: McpRunningService) -> Self {
        Self {
            server: server.to_string(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnection")
            .field("server", &self.server)
            .finish()
    }
}

#[async_trait]
impl ToolServerConnection for McpConnection {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>> {
        let tools = match self.peer.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => self
                .peer
                .list_tools(None)
                .await
                .map(|page| page.tools)
                .map_err(|e| map_service_error(&self.server, "list_tools", e))?,
            Err(e) => return Err(map_service_error(&self.server, "list_tools", e)),
        };

        Ok(tools
            .into_iter()
            .map(|tool| DynamicTool {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
                parameters: AgentToolParameters::from_schema(serde_json::Value::Object(
                    (*tool.input_schema).clone(),
                )),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<serde_json::Value> {
        let arguments = coerce_tool_arguments(name, arguments)?;
        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| AiboxError::tool(name, map_service_error(&self.server, "call_tool", e).to_string()))?;

        map_call_result(name, result)
    }

    async fn close(&self) -> Result<()> {
        if let Some(service) = self.service.lock().await.take() {
            service
                .cancel()
                .await
                .map_err(|e| AiboxError::tool_server(&self.server, format!("shutdown failed: {e}")))?;
        }
        Ok(())
    }
}

fn coerce_tool_arguments(name: &str, value: serde_json::Value) -> Result<Option<JsonObject>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: serde_json::Value = serde_json::from_str(trimmed)
                .map_err(|e| AiboxError::tool(name, format!("arguments must be valid JSON: {e}")))?;
            coerce_tool_arguments(name, parsed)
        }
        other => Err(AiboxError::tool(
            name,
            format!("arguments must be a JSON object; got {other}"),
        )),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let mut lines = Vec::new();
    for item in content {
        if let Some(text) = item.as_text() {
            lines.push(text.text.clone());
            continue;
        }
        if let Some(resource) = item.as_resource() {
            if let ResourceContents::TextResourceContents { text, .. } = &resource.resource {
                lines.push(text.clone());
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<serde_json::Value> {
    let text_content = extract_text_content(&result.content);

    if result.is_error.unwrap_or(false) {
        let message = result
            .structured_content
            .as_ref()
            .map(|v| v.to_string())
            .or(text_content)
            .unwrap_or_else(|| "tool server returned an error result".into());
        return Err(AiboxError::tool(name, message));
    }

    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }
    if let Some(text) = text_content {
        return Ok(serde_json::Value::String(text));
    }
    Ok(serde_json::Value::Array(
        result
            .content
            .iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect(),
    ))
}

fn map_client_initialize_error(server: &str, error: ClientInitializeError) -> AiboxError {
    let message = match error {
        ClientInitializeError::ConnectionClosed(context) => {
            format!("initialize connection closed: {context}")
        }
        ClientInitializeError::TransportError { error, context } => {
            format!("initialize transport error ({context}): {error}")
        }
        ClientInitializeError::JsonRpcError(error) => {
            format!("initialize JSON-RPC error {}: {}", error.code.0, error.message)
        }
        ClientInitializeError::Cancelled => "initialize cancelled".to_string(),
        other => format!("initialize error: {other}"),
    };
    AiboxError::tool_server(server, message)
}

fn map_service_error(server: &str, context: &str, error: ServiceError) -> AiboxError {
    let message = match error {
        ServiceError::McpError(error) => {
            format!("{context}: MCP error {}: {}", error.code.0, error.message)
        }
        ServiceError::TransportClosed => format!("{context}: transport closed"),
        ServiceError::UnexpectedResponse => format!("{context}: unexpected response"),
        ServiceError::Timeout { timeout } => {
            format!("{context}: timed out after {}ms", timeout.as_millis())
        }
        other => format!("{context}: {other}"),
    };
    AiboxError::tool_server(server, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_accepts_stringified_objects() {
        let coerced = coerce_tool_arguments("t", json!(r#"{"q":"rust"}"#)).expect("valid json");
        assert_eq!(coerced.and_then(|m| m.get("q").cloned()), Some(json!("rust")));
        assert!(coerce_tool_arguments("t", json!("  ")).expect("empty").is_none());
    }

    #[test]
    fn coerce_rejects_non_objects() {
        let err = coerce_tool_arguments("t", json!([1, 2])).expect_err("arrays rejected");
        assert!(matches!(err, AiboxError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn sse_servers_are_reported_as_connection_errors() {
        let mut config = ToolServerConfig::http("http://localhost:1/sse");
        config.transport = ToolServerTransport::Sse;
        let err = McpConnector::new()
            .connect("legacy-sse", &config)
            .await
            .err()
            .expect("sse is unsupported");
        assert!(matches!(err, AiboxError::ToolServerConnection { .. }));
    }
}

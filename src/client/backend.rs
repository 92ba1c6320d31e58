//! [`AgentBackend`] implementations: in-process and HTTP.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::controller::{AgentBackend, EventStream};
use super::reducer::RunInput;
use crate::error::{AiboxError, Result};
use crate::protocol::decode_stream;
use crate::server::{AgentService, ChatMessage, ChatRequest};
use crate::tools::ToolConfig;
use crate::types::{HistoryMessage, Role};

fn chat_request(
    thread_id: &str,
    input: &RunInput,
    model_id: Option<&String>,
    tool_config: Option<&ToolConfig>,
) -> ChatRequest {
    let mut messages: Vec<ChatMessage> = input
        .history
        .iter()
        .map(|message| match message.role {
            Role::Assistant => ChatMessage::assistant(message.content.clone()),
            _ => ChatMessage::user(message.content.clone()),
        })
        .collect();
    messages.push(ChatMessage::user_with_attachments(
        input.prompt.clone(),
        &input.attachments,
    ));
    ChatRequest {
        session_id: thread_id.to_string(),
        messages,
        model_id: model_id.cloned(),
        tool_config: tool_config.cloned(),
    }
}

/// Talks to an in-process [`AgentService`] through the wire encoding.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    service: AgentService,
    model_id: Option<String>,
    tool_config: Option<ToolConfig>,
}

impl LocalBackend {
    pub fn new(service: AgentService) -> Self {
        Self {
            service,
            model_id: None,
            tool_config: None,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_tool_config(mut self, tool_config: ToolConfig) -> Self {
        self.tool_config = Some(tool_config);
        self
    }

    pub fn service(&self) -> &AgentService {
        &self.service
    }
}

#[async_trait]
impl AgentBackend for LocalBackend {
    async fn start_run(&self, thread_id: &str, input: &RunInput) -> Result<EventStream> {
        let request = chat_request(
            thread_id,
            input,
            self.model_id.as_ref(),
            self.tool_config.as_ref(),
        );
        let frames = self.service.chat_sse(request).await?;
        let bytes = frames.map(|frame| frame.map(String::into_bytes));
        Ok(Box::pin(decode_stream(bytes)))
    }

    async fn sync_history(&self, thread_id: &str, history: Vec<HistoryMessage>) -> Result<()> {
        self.service.sync_history(thread_id, history).await.map(|_| ())
    }

    async fn clear_session(&self, thread_id: &str) -> Result<()> {
        self.service.clear_session(thread_id).await.map(|_| ())
    }
}

/// Talks to a remote server over HTTP.
///
/// Endpoints, relative to the base URL: `POST chat` (event stream),
/// `POST sessions/{id}/history`, `DELETE sessions/{id}`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    model_id: Option<String>,
    tool_config: Option<ToolConfig>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_id: None,
            tool_config: None,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_tool_config(mut self, tool_config: ToolConfig) -> Self {
        self.tool_config = Some(tool_config);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AiboxError::Protocol(format!(
            "server responded {}: {}",
            status.as_u16(),
            body
        )))
    }
}

#[async_trait]
impl AgentBackend for HttpBackend {
    async fn start_run(&self, thread_id: &str, input: &RunInput) -> Result<EventStream> {
        let request = chat_request(
            thread_id,
            input,
            self.model_id.as_ref(),
            self.tool_config.as_ref(),
        );
        let response = self
            .client
            .post(self.url("chat"))
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(Box::pin(decode_stream(response.bytes_stream())))
    }

    async fn sync_history(&self, thread_id: &str, history: Vec<HistoryMessage>) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("sessions/{thread_id}/history")))
            .json(&serde_json::json!({ "messages": history }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn clear_session(&self, thread_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("sessions/{thread_id}")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

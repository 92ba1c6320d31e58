//! Message types for model communication and session history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in an agent's conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ModelMessage {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(Role::System, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(Role::User, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a user message carrying attachment paths after its text.
    pub fn user_with_attachments(text: impl Into<String>, attachments: &[Attachment]) -> Self {
        let mut content = vec![ContentPart::Text { text: text.into() }];
        content.extend(attachments.iter().cloned().map(ContentPart::Attachment));
        Self::with_parts(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_parts(Role::Assistant, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        result: serde_json::Value,
        is_error: bool,
    ) -> Self {
        Self::with_parts(
            Role::Tool,
            vec![ContentPart::ToolResult(AgentToolResult {
                tool_call_id: tool_call_id.into(),
                result,
                is_error,
            })],
        )
    }

    pub fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract tool calls from this message.
    pub fn tool_calls(&self) -> Vec<&AgentToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }

    /// Whether this message carries a tool result.
    pub fn is_tool_result(&self) -> bool {
        self.content
            .iter()
            .any(|part| matches!(part, ContentPart::ToolResult(_)))
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Attachment(Attachment),
    ToolCall(AgentToolCall),
    ToolResult(AgentToolResult),
}

/// A file referenced by an opaque server-assigned path. Bytes never travel here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: None,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool execution result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolResult {
    pub tool_call_id: String,
    pub result: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

/// Plain role+text history as mirrored between client and server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Convert into a transcript message.
    pub fn to_model_message(&self) -> ModelMessage {
        ModelMessage::with_parts(
            self.role,
            vec![ContentPart::Text {
                text: self.content.clone(),
            }],
        )
    }
}

/// Project a transcript onto plain role+text history.
///
/// System and tool messages are dropped, assistant messages with no text
/// (pure tool-call turns) are skipped, and consecutive assistant texts from
/// one run are merged into a single entry.
pub fn project_history(transcript: &[ModelMessage]) -> Vec<HistoryMessage> {
    let mut history: Vec<HistoryMessage> = Vec::new();
    let mut last_role: Option<Role> = None;
    for message in transcript {
        match message.role {
            Role::User => {
                history.push(HistoryMessage::user(message.text()));
                last_role = Some(Role::User);
            }
            Role::Assistant => {
                let text = message.text();
                if text.is_empty() {
                    continue;
                }
                match (last_role, history.last_mut()) {
                    (Some(Role::Assistant), Some(prev)) => prev.content.push_str(&text),
                    _ => {
                        history.push(HistoryMessage::assistant(text));
                        last_role = Some(Role::Assistant);
                    }
                }
            }
            Role::System | Role::Tool => {}
        }
    }
    history
}

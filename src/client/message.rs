//! Client-side message log entries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Attachment, Role};

/// Status of one tool call within an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Completed,
    Errored,
}

/// A tool call as folded from run events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Accumulated JSON argument text.
    pub args_buffer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub status: ToolCallStatus,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args_buffer: String::new(),
            result: None,
            status: ToolCallStatus::Running,
        }
    }

    /// Parsed arguments, when the buffer holds valid JSON.
    pub fn arguments(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.args_buffer).ok()
    }
}

/// One entry of a thread's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub streaming: bool,
    /// Error notice of a failed run, shown after any partial content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            text_content: text.into(),
            reasoning_content: None,
            tool_calls: Vec::new(),
            attachments,
            streaming: false,
            error: None,
        }
    }

    /// An empty assistant message awaiting a run's events.
    pub fn placeholder() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            text_content: String::new(),
            reasoning_content: None,
            tool_calls: Vec::new(),
            attachments: Vec::new(),
            streaming: true,
            error: None,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|call| call.id == id)
    }

    pub(crate) fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCall> {
        self.tool_calls.iter_mut().find(|call| call.id == id)
    }

    /// Text to render: content, then the error notice if the run failed.
    pub fn display_text(&self) -> String {
        match (&self.error, self.text_content.is_empty()) {
            (None, _) => self.text_content.clone(),
            (Some(error), true) => error.clone(),
            (Some(error), false) => format!("{}\n\n{}", self.text_content, error),
        }
    }
}

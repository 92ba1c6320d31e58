//! Chat request payloads and their normalization into a run input.

use serde::{Deserialize, Serialize};

use crate::tools::ToolConfig;
use crate::types::{Attachment, HistoryMessage};

/// Body of a chat request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(alias = "threadId")]
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            session_id: session_id.into(),
            messages,
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

    /// Split the conversation into prompt and prior history.
    ///
    /// The last user message is the prompt; every other user or assistant
    /// message becomes plain history. Returns `None` without a user message.
    pub fn normalize(&self) -> Option<NormalizedChat> {
        let prompt_index = self.messages.iter().rposition(|m| m.role == "user")?;
        let prompt = &self.messages[prompt_index];
        let history = self
            .messages
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != prompt_index)
            .filter_map(|(_, message)| match message.role.as_str() {
                "user" => Some(HistoryMessage::user(message.content.text())),
                "assistant" => Some(HistoryMessage::assistant(message.content.text())),
                _ => None,
            })
            .collect();
        Some(NormalizedChat {
            prompt: prompt.content.text(),
            attachments: prompt.content.attachments(),
            history,
        })
    }
}

/// A chat request reduced to what a run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedChat {
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub history: Vec<HistoryMessage>,
}

/// One conversation message as sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: String,
    pub content: ChatContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: None,
            role: "user".to_string(),
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: None,
            role: "assistant".to_string(),
            content: ChatContent::Text(text.into()),
        }
    }

    /// A user message with file attachments after its text.
    pub fn user_with_attachments(text: impl Into<String>, attachments: &[Attachment]) -> Self {
        let mut parts = vec![ChatPart::Text { text: text.into() }];
        parts.extend(attachments.iter().map(|a| ChatPart::Binary {
            data: a.path.clone(),
            mime_type: a.mime_type.clone(),
        }));
        Self {
            id: None,
            role: "user".to_string(),
            content: ChatContent::Parts(parts),
        }
    }
}

/// Message content: a bare string or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

impl ChatContent {
    /// Text parts joined with newlines.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ChatPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Binary parts as attachment paths.
    pub fn attachments(&self) -> Vec<Attachment> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ChatPart::Binary { data, mime_type } if !data.is_empty() => Some(Attachment {
                        path: data.clone(),
                        mime_type: mime_type.clone(),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatPart {
    Text {
        text: String,
    },
    /// A file already uploaded to the server; `data` is its path.
    Binary {
        data: String,
        #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn last_user_message_is_the_prompt() {
        let request: ChatRequest = serde_json::from_value(json!({
            "threadId": "s1",
            "messages": [
                {"id": "1", "role": "user", "content": "Hi"},
                {"id": "2", "role": "assistant", "content": "Hello!"},
                {"id": "3", "role": "reasoning", "content": "hmm"},
                {"id": "4", "role": "user", "content": [
                    {"type": "text", "text": "What is in"},
                    {"type": "text", "text": "this file?"},
                    {"type": "binary", "data": "/uploads/a.pdf", "mimeType": "application/pdf"},
                    {"type": "image", "url": "ignored"}
                ]}
            ]
        }))
        .expect("request parses");

        assert_eq!(request.session_id, "s1");
        let chat = request.normalize().expect("has a user message");
        assert_eq!(chat.prompt, "What is in\nthis file?");
        assert_eq!(
            chat.attachments,
            vec![Attachment {
                path: "/uploads/a.pdf".into(),
                mime_type: Some("application/pdf".into())
            }]
        );
        assert_eq!(
            chat.history,
            vec![HistoryMessage::user("Hi"), HistoryMessage::assistant("Hello!")]
        );
    }

    #[test]
    fn no_user_message_normalizes_to_none() {
        let request = ChatRequest::new("s1", vec![ChatMessage::assistant("hello")]);
        assert!(request.normalize().is_none());
    }

    #[test]
    fn attachments_roundtrip_through_message_parts() {
        let attachment = Attachment::new("/uploads/img.png");
        let message = ChatMessage::user_with_attachments("look", std::slice::from_ref(&attachment));
        assert_eq!(message.content.text(), "look");
        assert_eq!(message.content.attachments(), vec![attachment]);
    }
}

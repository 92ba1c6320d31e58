//! JSON payloads carried by `data:` frames.

use serde::{Deserialize, Serialize};

/// Status value of the end-of-stream marker.
pub const COMPLETE_STATUS: &str = "complete";

fn assistant_role() -> String {
    "assistant".to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Wire event taxonomy; `type` is the tag, fields are camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum WireEvent {
    RunStarted {
        thread_id: String,
        run_id: String,
    },
    TextMessageStart {
        message_id: String,
        #[serde(default = "assistant_role")]
        role: String,
    },
    TextMessageContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        delta: String,
    },
    TextMessageEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    ReasoningMessageStart {
        message_id: String,
        #[serde(default = "assistant_role")]
        role: String,
    },
    ReasoningMessageContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        delta: String,
    },
    ReasoningMessageEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },
    ToolCallArgs {
        tool_call_id: String,
        delta: String,
    },
    ToolCallEnd {
        tool_call_id: String,
    },
    ToolCallResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        tool_call_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
    RunFinished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
    },
    RunError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Any event type this codec does not model.
    #[serde(other)]
    Unknown,
}

/// End-of-stream marker frame: `{"status":"complete"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub status: String,
}

impl CompletionMarker {
    pub fn complete() -> Self {
        Self {
            status: COMPLETE_STATUS.to_string(),
        }
    }
}

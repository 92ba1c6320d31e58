//! Core run types for the agent loop.

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::ToolConfig;
use crate::types::{Attachment, HistoryMessage};

/// Message reported when a chat request carries no user message.
pub const NO_USER_MESSAGE: &str = "No user message in request.";

/// Message reported to clients when a run fails. Details go to the log.
pub const RUN_FAILED_MESSAGE: &str = "An error occurred during streaming.";

/// Input for one run: one user turn against one session.
#[derive(Debug, Clone, Builder)]
pub struct RunRequest {
    #[builder(into)]
    pub session_id: String,
    #[builder(into)]
    pub model_id: String,
    #[builder(into)]
    pub prompt: String,
    #[builder(default)]
    pub attachments: Vec<Attachment>,
    /// Plain history preceding the prompt.
    #[builder(default)]
    pub history: Vec<HistoryMessage>,
    #[builder(default)]
    pub tool_config: ToolConfig,
}

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Canceled,
}

/// Result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    /// Final assistant text of a completed run.
    #[serde(default)]
    pub assistant_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn completed(assistant_text: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Completed,
            assistant_text: assistant_text.into(),
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn canceled() -> Self {
        Self {
            status: RunStatus::Canceled,
            assistant_text: String::new(),
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            assistant_text: String::new(),
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

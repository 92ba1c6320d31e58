//! Run event taxonomy and the translator from agent updates to run events.

use uuid::Uuid;

use super::types::RUN_FAILED_MESSAGE;
use crate::error::AiboxError;

/// One event of a run, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RunStarted {
        thread_id: String,
        run_id: String,
    },
    TextMessageStart {
        message_id: String,
    },
    TextDelta {
        run_id: String,
        message_id: String,
        delta: String,
    },
    TextMessageEnd {
        message_id: String,
    },
    ReasoningMessageStart {
        message_id: String,
    },
    ReasoningDelta {
        run_id: String,
        message_id: String,
        delta: String,
    },
    ReasoningMessageEnd {
        message_id: String,
    },
    ToolCallStart {
        run_id: String,
        tool_call_id: String,
        name: String,
        parent_message_id: Option<String>,
    },
    ToolCallArgsDelta {
        tool_call_id: String,
        delta: String,
    },
    ToolCallEnd {
        tool_call_id: String,
    },
    ToolCallResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
        message_id: Option<String>,
    },
    RunError {
        message: String,
    },
    RunFinished,
}

impl RunEvent {
    /// `RunFinished` or `RunError`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished | Self::RunError { .. })
    }

    /// Tool call this event belongs to, if any.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCallStart { tool_call_id, .. }
            | Self::ToolCallArgsDelta { tool_call_id, .. }
            | Self::ToolCallEnd { tool_call_id }
            | Self::ToolCallResult { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

/// Internal callback vocabulary of a running agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentUpdate {
    Reasoning(String),
    Text(String),
    ToolCallStart { id: String, name: String },
    ToolCallArgs { id: String, delta: String },
    ToolCallEnd { id: String },
    ToolResult {
        id: String,
        content: serde_json::Value,
        is_error: bool,
    },
}

/// Translates [`AgentUpdate`]s into [`RunEvent`]s for one run.
///
/// Owns message framing: all text of a run shares one message id, and each
/// contiguous stretch of reasoning gets its own reasoning message.
#[derive(Debug)]
pub struct EventTranslator {
    thread_id: String,
    run_id: String,
    text_message_id: String,
    text_open: bool,
    reasoning_message_id: Option<String>,
}

impl EventTranslator {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            text_message_id: Uuid::new_v4().to_string(),
            text_open: false,
            reasoning_message_id: None,
        }
    }

    pub fn text_message_id(&self) -> &str {
        &self.text_message_id
    }

    /// The first event of every run.
    pub fn start(&self) -> RunEvent {
        RunEvent::RunStarted {
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
        }
    }

    pub fn translate(&mut self, update: AgentUpdate) -> Vec<RunEvent> {
        let mut events = Vec::new();
        match update {
            AgentUpdate::Reasoning(delta) => {
                if delta.is_empty() {
                    return events;
                }
                let message_id = match &self.reasoning_message_id {
                    Some(id) => id.clone(),
                    None => {
                        let id = Uuid::new_v4().to_string();
                        events.push(RunEvent::ReasoningMessageStart {
                            message_id: id.clone(),
                        });
                        self.reasoning_message_id = Some(id.clone());
                        id
                    }
                };
                events.push(RunEvent::ReasoningDelta {
                    run_id: self.run_id.clone(),
                    message_id,
                    delta,
                });
            }
            AgentUpdate::Text(delta) => {
                if delta.is_empty() {
                    return events;
                }
                self.close_reasoning(&mut events);
                if !self.text_open {
                    self.text_open = true;
                    events.push(RunEvent::TextMessageStart {
                        message_id: self.text_message_id.clone(),
                    });
                }
                events.push(RunEvent::TextDelta {
                    run_id: self.run_id.clone(),
                    message_id: self.text_message_id.clone(),
                    delta,
                });
            }
            AgentUpdate::ToolCallStart { id, name } => {
                self.close_reasoning(&mut events);
                events.push(RunEvent::ToolCallStart {
                    run_id: self.run_id.clone(),
                    tool_call_id: id,
                    name,
                    parent_message_id: Some(self.text_message_id.clone()),
                });
            }
            AgentUpdate::ToolCallArgs { id, delta } => {
                events.push(RunEvent::ToolCallArgsDelta {
                    tool_call_id: id,
                    delta,
                });
            }
            AgentUpdate::ToolCallEnd { id } => {
                events.push(RunEvent::ToolCallEnd { tool_call_id: id });
            }
            AgentUpdate::ToolResult {
                id,
                content,
                is_error,
            } => {
                let content = match content {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                events.push(RunEvent::ToolCallResult {
                    tool_call_id: id,
                    content,
                    is_error,
                    message_id: Some(Uuid::new_v4().to_string()),
                });
            }
        }
        events
    }

    /// Closing events for a finished run.
    ///
    /// A run-fatal error closes with `RunError`; anything else that ends a
    /// run early (cancellation) emits nothing.
    pub fn finish<T>(&mut self, outcome: &Result<T, AiboxError>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        match outcome {
            Ok(_) => {
                self.close_reasoning(&mut events);
                if self.text_open {
                    self.text_open = false;
                    events.push(RunEvent::TextMessageEnd {
                        message_id: self.text_message_id.clone(),
                    });
                }
                events.push(RunEvent::RunFinished);
            }
            Err(e) if e.is_run_fatal() => events.push(RunEvent::RunError {
                message: RUN_FAILED_MESSAGE.to_string(),
            }),
            Err(_) => {}
        }
        events
    }

    fn close_reasoning(&mut self, events: &mut Vec<RunEvent>) {
        if let Some(message_id) = self.reasoning_message_id.take() {
            events.push(RunEvent::ReasoningMessageEnd { message_id });
        }
    }
}

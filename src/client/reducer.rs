//! Folds run events into a thread's message log.

use crate::agent_loop::RunEvent;
use crate::types::{Attachment, HistoryMessage};

use super::message::{Message, ToolCall, ToolCallStatus};

/// Lifecycle of the thread's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Idle,
    Streaming,
    Finalized,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed | Self::Cancelled)
    }
}

/// Identifies one run started by a reducer; events for any other ticket are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunTicket(u64);

/// What a run needs from the client: the prompt and the history before it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInput {
    pub ticket: RunTicket,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub history: Vec<HistoryMessage>,
}

impl RunInput {
    /// History followed by the prompt.
    pub fn transcript(&self) -> Vec<HistoryMessage> {
        let mut transcript = self.history.clone();
        transcript.push(HistoryMessage::user(self.prompt.clone()));
        transcript
    }
}

/// Result of undoing the last exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Retraction {
    /// The removed user message's text, exactly as submitted.
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// The truncated log as plain history, for the server.
    pub history: Vec<HistoryMessage>,
}

/// Client-side run state machine over one thread's message log.
///
/// `Idle → Streaming → {Finalized | Failed | Cancelled}` per run. The reducer
/// does not refuse a submit while streaming; callers gate that.
#[derive(Debug)]
pub struct ClientRunReducer {
    messages: Vec<Message>,
    state: RunState,
    active: Option<RunTicket>,
    next_ticket: u64,
}

impl Default for ClientRunReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRunReducer {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            state: RunState::Idle,
            active: None,
            next_ticket: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == RunState::Streaming
    }

    pub fn active_ticket(&self) -> Option<RunTicket> {
        self.active
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Settled messages as plain role+text history.
    ///
    /// The streaming placeholder and assistant messages without text are
    /// left out.
    pub fn history(&self) -> Vec<HistoryMessage> {
        history_of(&self.messages)
    }

    /// Append a user message and a streaming placeholder, starting a run.
    pub fn submit(&mut self, text: impl Into<String>, attachments: Vec<Attachment>) -> RunInput {
        let history = self.history();
        let text = text.into();
        self.messages
            .push(Message::user(text.clone(), attachments.clone()));
        let ticket = self.start_run();
        RunInput {
            ticket,
            prompt: text,
            attachments,
            history,
        }
    }

    /// Fold one event of the run identified by `ticket`.
    ///
    /// Returns whether the event was applied; events of stale runs and events
    /// after the run settled are ignored.
    pub fn apply(&mut self, ticket: RunTicket, event: &RunEvent) -> bool {
        if self.state != RunState::Streaming || self.active != Some(ticket) {
            return false;
        }
        let Some(message) = self
            .messages
            .last_mut()
            .filter(|m| m.is_assistant() && m.streaming)
        else {
            return false;
        };

        match event {
            RunEvent::TextDelta { delta, .. } => message.text_content.push_str(delta),
            RunEvent::ReasoningDelta { delta, .. } => message
                .reasoning_content
                .get_or_insert_with(String::new)
                .push_str(delta),
            RunEvent::ToolCallStart {
                tool_call_id, name, ..
            } => {
                if message.tool_call(tool_call_id).is_none() {
                    message.tool_calls.push(ToolCall::new(tool_call_id, name));
                }
            }
            RunEvent::ToolCallArgsDelta {
                tool_call_id,
                delta,
            } => {
                if let Some(call) = message.tool_call_mut(tool_call_id) {
                    call.args_buffer.push_str(delta);
                }
            }
            RunEvent::ToolCallResult {
                tool_call_id,
                content,
                is_error,
                ..
            } => {
                if let Some(call) = message.tool_call_mut(tool_call_id) {
                    call.result = Some(content.clone());
                    call.status = if *is_error {
                        ToolCallStatus::Errored
                    } else {
                        ToolCallStatus::Completed
                    };
                }
            }
            RunEvent::RunFinished => {
                message.streaming = false;
                self.settle(RunState::Finalized);
            }
            RunEvent::RunError { message: error } => {
                message.streaming = false;
                message.error = Some(error.clone());
                self.settle(RunState::Failed);
            }
            RunEvent::RunStarted { .. }
            | RunEvent::TextMessageStart { .. }
            | RunEvent::TextMessageEnd { .. }
            | RunEvent::ReasoningMessageStart { .. }
            | RunEvent::ReasoningMessageEnd { .. }
            | RunEvent::ToolCallEnd { .. } => {}
        }
        true
    }

    /// Stop honoring the in-flight run, keeping its partial content.
    ///
    /// Returns the cancelled run's ticket, or `None` when nothing streams.
    pub fn cancel(&mut self) -> Option<RunTicket> {
        if self.state != RunState::Streaming {
            return None;
        }
        if let Some(message) = self.messages.last_mut().filter(|m| m.streaming) {
            message.streaming = false;
        }
        let ticket = self.active;
        self.settle(RunState::Cancelled);
        ticket
    }

    /// Remove the last user+assistant exchange.
    ///
    /// No-op unless the log ends with a settled assistant message answering a
    /// user message.
    pub fn retract(&mut self) -> Option<Retraction> {
        if self.is_streaming() || !self.ends_with_settled_exchange() {
            return None;
        }
        self.messages.pop();
        let user = self.messages.pop()?;
        Some(Retraction {
            text: user.text_content,
            attachments: user.attachments,
            history: self.history(),
        })
    }

    /// Discard the last assistant message and run its prompt again.
    ///
    /// No-op unless the log ends with a settled assistant message answering a
    /// user message.
    pub fn reload(&mut self) -> Option<RunInput> {
        if self.is_streaming() || !self.ends_with_settled_exchange() {
            return None;
        }
        self.messages.pop();
        let prompt_index = self.messages.len() - 1;
        let user = &self.messages[prompt_index];
        let prompt = user.text_content.clone();
        let attachments = user.attachments.clone();
        let history = history_of(&self.messages[..prompt_index]);
        let ticket = self.start_run();
        Some(RunInput {
            ticket,
            prompt,
            attachments,
            history,
        })
    }

    fn ends_with_settled_exchange(&self) -> bool {
        match self.messages.as_slice() {
            [.., user, assistant] => user.is_user() && assistant.is_assistant() && !assistant.streaming,
            _ => false,
        }
    }

    fn start_run(&mut self) -> RunTicket {
        self.next_ticket += 1;
        let ticket = RunTicket(self.next_ticket);
        self.messages.push(Message::placeholder());
        self.state = RunState::Streaming;
        self.active = Some(ticket);
        ticket
    }

    fn settle(&mut self, state: RunState) {
        self.state = state;
        self.active = None;
    }
}

fn history_of(messages: &[Message]) -> Vec<HistoryMessage> {
    messages
        .iter()
        .filter(|m| !m.streaming)
        .filter_map(|m| {
            if m.is_user() {
                Some(HistoryMessage::user(m.text_content.clone()))
            } else if m.is_assistant() && !m.text_content.is_empty() {
                Some(HistoryMessage::assistant(m.text_content.clone()))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(delta: &str) -> RunEvent {
        RunEvent::TextDelta {
            run_id: "r".into(),
            message_id: "m".into(),
            delta: delta.into(),
        }
    }

    fn exchange(reducer: &mut ClientRunReducer, prompt: &str, reply: &str) {
        let input = reducer.submit(prompt, Vec::new());
        reducer.apply(input.ticket, &text(reply));
        reducer.apply(input.ticket, &RunEvent::RunFinished);
    }

    #[test]
    fn submit_appends_user_and_streaming_placeholder() {
        let mut reducer = ClientRunReducer::new();
        assert_eq!(reducer.state(), RunState::Idle);

        let input = reducer.submit("hello", Vec::new());
        assert_eq!(reducer.state(), RunState::Streaming);
        assert_eq!(input.prompt, "hello");
        assert!(input.history.is_empty());
        assert_eq!(reducer.messages().len(), 2);
        assert!(reducer.messages()[0].is_user());
        assert!(reducer.messages()[1].streaming);
    }

    #[test]
    fn tool_events_fold_into_tool_calls() {
        let mut reducer = ClientRunReducer::new();
        let input = reducer.submit("weather?", Vec::new());
        let t = input.ticket;
        reducer.apply(
            t,
            &RunEvent::ToolCallStart {
                run_id: "r".into(),
                tool_call_id: "c1".into(),
                name: "get_weather".into(),
                parent_message_id: None,
            },
        );
        for delta in ["{\"city\":", "\"Tokyo\"}"] {
            reducer.apply(
                t,
                &RunEvent::ToolCallArgsDelta {
                    tool_call_id: "c1".into(),
                    delta: delta.into(),
                },
            );
        }
        reducer.apply(t, &RunEvent::ToolCallEnd { tool_call_id: "c1".into() });
        let call = &reducer.messages()[1].tool_calls[0];
        assert_eq!(call.status, ToolCallStatus::Running);
        assert_eq!(call.args_buffer, "{\"city\":\"Tokyo\"}");

        reducer.apply(
            t,
            &RunEvent::ToolCallResult {
                tool_call_id: "c1".into(),
                content: "{\"error\":\"down\"}".into(),
                is_error: true,
                message_id: None,
            },
        );
        let call = &reducer.messages()[1].tool_calls[0];
        assert_eq!(call.status, ToolCallStatus::Errored);
        assert_eq!(call.result.as_deref(), Some("{\"error\":\"down\"}"));
    }

    #[test]
    fn run_error_keeps_partial_content_and_fails() {
        let mut reducer = ClientRunReducer::new();
        let input = reducer.submit("hi", Vec::new());
        reducer.apply(input.ticket, &text("partial"));
        reducer.apply(
            input.ticket,
            &RunEvent::RunError {
                message: "An error occurred during streaming.".into(),
            },
        );

        assert_eq!(reducer.state(), RunState::Failed);
        let message = &reducer.messages()[1];
        assert!(!message.streaming);
        assert_eq!(message.text_content, "partial");
        assert_eq!(
            message.display_text(),
            "partial\n\nAn error occurred during streaming."
        );
        assert!(!reducer.apply(input.ticket, &text("late")));
    }

    #[test]
    fn cancel_freezes_partial_content_and_ignores_later_events() {
        let mut reducer = ClientRunReducer::new();
        let input = reducer.submit("hi", Vec::new());
        reducer.apply(input.ticket, &text("par"));

        assert_eq!(reducer.cancel(), Some(input.ticket));
        assert_eq!(reducer.state(), RunState::Cancelled);
        assert!(!reducer.apply(input.ticket, &text("tial")));
        assert!(!reducer.apply(input.ticket, &RunEvent::RunFinished));
        assert_eq!(reducer.messages()[1].text_content, "par");
        assert!(!reducer.messages()[1].streaming);
        assert_eq!(reducer.cancel(), None);
    }

    #[test]
    fn stale_tickets_are_ignored() {
        let mut reducer = ClientRunReducer::new();
        let first = reducer.submit("one", Vec::new());
        reducer.cancel();
        let second = reducer.submit("two", Vec::new());
        assert!(!reducer.apply(first.ticket, &text("old")));
        assert!(reducer.apply(second.ticket, &text("new")));
        assert_eq!(reducer.messages()[3].text_content, "new");
    }

    #[test]
    fn retract_requires_a_settled_exchange() {
        let mut reducer = ClientRunReducer::new();
        assert_eq!(reducer.retract(), None);
        reducer.submit("hi", Vec::new());
        assert_eq!(reducer.retract(), None);
    }

    #[test]
    fn reload_requires_trailing_assistant_message() {
        let mut reducer = ClientRunReducer::new();
        assert_eq!(reducer.reload(), None);
        exchange(&mut reducer, "U1", "A1");
        let input = reducer.reload().expect("reload");
        assert!(reducer.is_streaming());
        assert_eq!(reducer.reload(), None);
        assert_eq!(input.transcript(), vec![HistoryMessage::user("U1")]);
    }
}

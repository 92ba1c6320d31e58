//! Sliding-window conversation transcript.

use crate::types::{project_history, HistoryMessage, ModelMessage, Role};

/// An agent's transcript, capped at `window` messages.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ModelMessage>,
    window: usize,
    /// Older messages have been dropped from the front.
    truncated: bool,
}

impl Conversation {
    pub fn new(window: usize) -> Self {
        Self {
            messages: Vec::new(),
            window: window.max(1),
            truncated: false,
        }
    }

    /// Get all messages.
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Replace the transcript with one run's committed messages.
    pub fn commit(&mut self, messages: Vec<ModelMessage>) {
        self.messages = messages;
        self.trim();
    }

    /// Plain role+text view of the transcript.
    pub fn history(&self) -> Vec<HistoryMessage> {
        project_history(&self.messages)
    }

    /// Adopt `history` when it disagrees with the transcript.
    ///
    /// Once the window has dropped older messages, the transcript agrees
    /// when it matches the tail of `history`. Returns whether the
    /// transcript was replaced.
    pub fn reconcile(&mut self, history: &[HistoryMessage]) -> bool {
        if self.agrees_with(history) {
            return false;
        }
        self.messages = history.iter().map(HistoryMessage::to_model_message).collect();
        self.truncated = false;
        self.trim();
        true
    }

    fn agrees_with(&self, history: &[HistoryMessage]) -> bool {
        let projected = self.history();
        if !self.truncated || projected.is_empty() {
            return projected == history;
        }
        history.ends_with(&projected)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.truncated = false;
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop the oldest messages beyond the window. The window always starts
    /// on a user message so tool results never lose their calls.
    fn trim(&mut self) {
        if self.messages.len() <= self.window {
            return;
        }
        let mut start = self.messages.len() - self.window;
        while start < self.messages.len() && self.messages[start].role != Role::User {
            start += 1;
        }
        self.messages.drain(..start);
        self.truncated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentToolCall, ContentPart};
    use pretty_assertions::assert_eq;

    fn exchange(n: usize) -> Vec<ModelMessage> {
        (0..n)
            .flat_map(|i| {
                [
                    ModelMessage::user(format!("q{i}")),
                    ModelMessage::assistant(format!("a{i}")),
                ]
            })
            .collect()
    }

    #[test]
    fn window_keeps_latest_messages() {
        let mut conversation = Conversation::new(4);
        conversation.commit(exchange(5));
        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation.messages()[0].text(), "q3");
    }

    #[test]
    fn window_never_starts_on_a_tool_result() {
        let mut messages = exchange(1);
        messages.push(ModelMessage::user("weather?"));
        messages.push(ModelMessage::assistant(""));
        messages.push(ModelMessage::tool_result("c1", serde_json::json!({}), false));
        messages.push(ModelMessage::assistant("sunny"));

        let mut conversation = Conversation::new(3);
        conversation.commit(messages);

        // The three newest begin at a tool result; the cut moves forward to the
        // next user message, which does not exist, so nothing dangling is kept.
        assert!(conversation
            .messages()
            .first()
            .map_or(true, |m| m.role == Role::User));
    }

    #[test]
    fn reconcile_replaces_diverged_transcript() {
        let mut conversation = Conversation::new(40);
        conversation.commit(exchange(2));

        let truncated = vec![HistoryMessage::user("q0"), HistoryMessage::assistant("a0")];
        assert!(conversation.reconcile(&truncated));
        assert_eq!(conversation.history(), truncated);
        assert!(!conversation.reconcile(&truncated));
    }

    #[test]
    fn reconcile_accepts_full_history_once_the_window_slides() {
        let mut messages = exchange(2);
        messages.push(ModelMessage::user("weather?"));
        messages.push(ModelMessage::with_parts(
            Role::Assistant,
            vec![ContentPart::ToolCall(AgentToolCall {
                id: "c1".into(),
                name: "get_weather".into(),
                arguments: serde_json::json!({}),
            })],
        ));
        messages.push(ModelMessage::tool_result("c1", serde_json::json!({"temperature_c": 21}), false));
        messages.push(ModelMessage::assistant("sunny"));

        let mut conversation = Conversation::new(6);
        conversation.commit(messages);
        assert_eq!(conversation.messages()[0].text(), "q1");

        let client_history = vec![
            HistoryMessage::user("q0"),
            HistoryMessage::assistant("a0"),
            HistoryMessage::user("q1"),
            HistoryMessage::assistant("a1"),
            HistoryMessage::user("weather?"),
            HistoryMessage::assistant("sunny"),
        ];
        assert!(!conversation.reconcile(&client_history));
        assert_eq!(conversation.len(), 6);

        let edited = vec![
            HistoryMessage::user("q0"),
            HistoryMessage::assistant("a0"),
            HistoryMessage::user("q1"),
            HistoryMessage::assistant("a1"),
        ];
        assert!(conversation.reconcile(&edited));
        assert_eq!(conversation.history(), edited);
    }

    #[test]
    fn reconcile_rejects_extra_history_before_an_untrimmed_transcript() {
        let mut conversation = Conversation::new(40);
        conversation.commit(vec![ModelMessage::user("q1"), ModelMessage::assistant("a1")]);

        let longer = vec![
            HistoryMessage::user("q0"),
            HistoryMessage::assistant("a0"),
            HistoryMessage::user("q1"),
            HistoryMessage::assistant("a1"),
        ];
        assert!(conversation.reconcile(&longer));
        assert_eq!(conversation.len(), 4);
    }
}

//! `data: <json>\n\n` framing for run events.

use futures::{Stream, StreamExt};
use serde::Serialize;

use super::wire::{CompletionMarker, WireEvent, COMPLETE_STATUS};
use crate::agent_loop::RunEvent;
use crate::error::{AiboxError, Result};

/// Serialize one payload as a frame.
pub fn encode_frame<T: Serialize>(payload: &T) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(payload)?))
}

/// The end-of-stream marker frame.
pub fn completion_frame() -> Result<String> {
    encode_frame(&CompletionMarker::complete())
}

/// Encodes the events of one run.
///
/// Remembers the thread and run ids announced by `RunStarted` so the closing
/// `RUN_FINISHED` frame can carry them. `RunFinished` is followed by the
/// completion marker.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    thread_id: Option<String>,
    run_id: Option<String>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, event: &RunEvent) -> Result<String> {
        let wire = match event {
            RunEvent::RunStarted { thread_id, run_id } => {
                self.thread_id = Some(thread_id.clone());
                self.run_id = Some(run_id.clone());
                WireEvent::RunStarted {
                    thread_id: thread_id.clone(),
                    run_id: run_id.clone(),
                }
            }
            RunEvent::TextMessageStart { message_id } => WireEvent::TextMessageStart {
                message_id: message_id.clone(),
                role: "assistant".to_string(),
            },
            RunEvent::TextDelta {
                message_id, delta, ..
            } => WireEvent::TextMessageContent {
                message_id: Some(message_id.clone()),
                delta: delta.clone(),
            },
            RunEvent::TextMessageEnd { message_id } => WireEvent::TextMessageEnd {
                message_id: Some(message_id.clone()),
            },
            RunEvent::ReasoningMessageStart { message_id } => WireEvent::ReasoningMessageStart {
                message_id: message_id.clone(),
                role: "reasoning".to_string(),
            },
            RunEvent::ReasoningDelta {
                message_id, delta, ..
            } => WireEvent::ReasoningMessageContent {
                message_id: Some(message_id.clone()),
                delta: delta.clone(),
            },
            RunEvent::ReasoningMessageEnd { message_id } => WireEvent::ReasoningMessageEnd {
                message_id: Some(message_id.clone()),
            },
            RunEvent::ToolCallStart {
                tool_call_id,
                name,
                parent_message_id,
                ..
            } => WireEvent::ToolCallStart {
                tool_call_id: tool_call_id.clone(),
                tool_call_name: name.clone(),
                parent_message_id: parent_message_id.clone(),
            },
            RunEvent::ToolCallArgsDelta {
                tool_call_id,
                delta,
            } => WireEvent::ToolCallArgs {
                tool_call_id: tool_call_id.clone(),
                delta: delta.clone(),
            },
            RunEvent::ToolCallEnd { tool_call_id } => WireEvent::ToolCallEnd {
                tool_call_id: tool_call_id.clone(),
            },
            RunEvent::ToolCallResult {
                tool_call_id,
                content,
                is_error,
                message_id,
            } => WireEvent::ToolCallResult {
                message_id: message_id.clone(),
                tool_call_id: tool_call_id.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
            RunEvent::RunError { message } => WireEvent::RunError {
                message: message.clone(),
                code: None,
            },
            RunEvent::RunFinished => {
                let mut frame = encode_frame(&WireEvent::RunFinished {
                    thread_id: self.thread_id.clone(),
                    run_id: self.run_id.clone(),
                })?;
                frame.push_str(&completion_frame()?);
                return Ok(frame);
            }
        };
        encode_frame(&wire)
    }
}

/// Encode a run's event stream into frames.
pub fn encode_stream<S>(events: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = RunEvent> + Send,
{
    let mut encoder = FrameEncoder::new();
    events.map(move |event| encoder.encode(&event))
}

/// Incremental frame decoder.
///
/// Accepts arbitrary byte chunks; frames may be split anywhere. Comment lines
/// and non-`data` fields are skipped, unknown event types are ignored, and
/// nothing is yielded after the first terminal event.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    run_id: Option<String>,
    text_message_id: Option<String>,
    reasoning_message_id: Option<String>,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal event has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run id announced by the stream, once seen.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<RunEvent>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line, &mut events)?;
        }
        Ok(events)
    }

    /// Flush buffered input at end of stream.
    ///
    /// A stream that closes without a terminal event finishes the run.
    pub fn finish(&mut self) -> Result<Vec<RunEvent>> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.push_line(&line, &mut events)?;
        }
        self.dispatch(&mut events)?;
        if !self.finished {
            self.finished = true;
            events.push(RunEvent::RunFinished);
        }
        Ok(events)
    }

    fn push_line(&mut self, raw: &[u8], events: &mut Vec<RunEvent>) -> Result<()> {
        let line = std::str::from_utf8(raw)
            .map_err(|e| AiboxError::Protocol(format!("frame is not valid UTF-8: {e}")))?;
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return self.dispatch(events);
        }
        if line.starts_with(':') {
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            self.data_lines.push(rest.to_string());
        }
        Ok(())
    }

    fn dispatch(&mut self, events: &mut Vec<RunEvent>) -> Result<()> {
        if self.data_lines.is_empty() {
            return Ok(());
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        if self.finished || data == "[DONE]" {
            return Ok(());
        }
        if let Some(event) = self.decode_payload(&data)? {
            self.finished = event.is_terminal();
            events.push(event);
        }
        Ok(())
    }

    fn decode_payload(&mut self, data: &str) -> Result<Option<RunEvent>> {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| AiboxError::Protocol(format!("malformed frame: {e}")))?;
        if value.get("type").is_none()
            && value.get("status").and_then(|s| s.as_str()) == Some(COMPLETE_STATUS)
        {
            return Ok(Some(RunEvent::RunFinished));
        }
        let wire: WireEvent = serde_json::from_value(value)
            .map_err(|e| AiboxError::Protocol(format!("invalid event: {e}")))?;
        Ok(self.to_run_event(wire))
    }

    fn to_run_event(&mut self, wire: WireEvent) -> Option<RunEvent> {
        let run_id = self.run_id.clone().unwrap_or_default();
        let event = match wire {
            WireEvent::RunStarted { thread_id, run_id } => {
                self.run_id = Some(run_id.clone());
                RunEvent::RunStarted { thread_id, run_id }
            }
            WireEvent::TextMessageStart { message_id, .. } => {
                self.text_message_id = Some(message_id.clone());
                RunEvent::TextMessageStart { message_id }
            }
            WireEvent::TextMessageContent { message_id, delta } => RunEvent::TextDelta {
                run_id,
                message_id: message_id
                    .or_else(|| self.text_message_id.clone())
                    .unwrap_or_default(),
                delta,
            },
            WireEvent::TextMessageEnd { message_id } => RunEvent::TextMessageEnd {
                message_id: message_id
                    .or_else(|| self.text_message_id.clone())
                    .unwrap_or_default(),
            },
            WireEvent::ReasoningMessageStart { message_id, .. } => {
                self.reasoning_message_id = Some(message_id.clone());
                RunEvent::ReasoningMessageStart { message_id }
            }
            WireEvent::ReasoningMessageContent { message_id, delta } => RunEvent::ReasoningDelta {
                run_id,
                message_id: message_id
                    .or_else(|| self.reasoning_message_id.clone())
                    .unwrap_or_default(),
                delta,
            },
            WireEvent::ReasoningMessageEnd { message_id } => RunEvent::ReasoningMessageEnd {
                message_id: message_id
                    .or_else(|| self.reasoning_message_id.take())
                    .unwrap_or_default(),
            },
            WireEvent::ToolCallStart {
                tool_call_id,
                tool_call_name,
                parent_message_id,
            } => RunEvent::ToolCallStart {
                run_id,
                tool_call_id,
                name: tool_call_name,
                parent_message_id,
            },
            WireEvent::ToolCallArgs {
                tool_call_id,
                delta,
            } => RunEvent::ToolCallArgsDelta {
                tool_call_id,
                delta,
            },
            WireEvent::ToolCallEnd { tool_call_id } => RunEvent::ToolCallEnd { tool_call_id },
            WireEvent::ToolCallResult {
                message_id,
                tool_call_id,
                content,
                is_error,
            } => RunEvent::ToolCallResult {
                tool_call_id,
                content,
                is_error,
                message_id,
            },
            WireEvent::RunFinished { .. } => RunEvent::RunFinished,
            WireEvent::RunError { message, .. } => RunEvent::RunError { message },
            WireEvent::Unknown => {
                tracing::trace!("skipping unrecognized event type");
                return None;
            }
        };
        Some(event)
    }
}

/// Decode a byte stream of frames into run events.
///
/// Ends after the first terminal event; a clean close without one yields
/// `RunFinished`.
pub fn decode_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<RunEvent>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    async_stream::try_stream! {
        let mut decoder = FrameDecoder::new();
        let mut bytes = Box::pin(bytes);
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk
                .map_err(|e| AiboxError::Protocol(format!("event stream read failed: {e}")))?;
            for event in decoder.push(chunk.as_ref())? {
                yield event;
            }
            if decoder.is_finished() {
                break;
            }
        }
        if !decoder.is_finished() {
            for event in decoder.finish()? {
                yield event;
            }
        }
    }
}

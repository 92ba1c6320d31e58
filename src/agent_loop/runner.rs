//! Run coordination: one streamed agent turn per session at a time.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::error::{AiboxError, Result};
use crate::provider::{ProviderDelta, ProviderRequest, SharedProvider};
use crate::session::{SessionAgent, SessionAgentCache, SessionLease};
use crate::tools::{Tool, ToolArguments, ToolExecutionContext};
use crate::types::{AgentToolCall, ContentPart, ModelMessage, Role};

use super::events::{AgentUpdate, EventTranslator, RunEvent};
use super::types::{RunRequest, RunResult, NO_USER_MESSAGE};

const UPDATE_BUFFER: usize = 64;

/// Ordered event stream of one run.
///
/// Dropping the stream cancels the run. After [`cancel`](Self::cancel) the
/// stream yields nothing further.
pub struct RunStream {
    run_id: String,
    events: mpsc::Receiver<RunEvent>,
    cancel: CancellationToken,
    result: Option<oneshot::Receiver<RunResult>>,
    _guard: DropGuard,
}

impl RunStream {
    fn new(
        run_id: String,
        events: mpsc::Receiver<RunEvent>,
        cancel: CancellationToken,
        result: oneshot::Receiver<RunResult>,
    ) -> Self {
        let guard = cancel.clone().drop_guard();
        Self {
            run_id,
            events,
            cancel,
            result: Some(result),
            _guard: guard,
        }
    }

    /// A run that never started: a single `RunError` and nothing else.
    pub fn rejected(message: &str) -> Self {
        let (events_tx, events_rx) = mpsc::channel(1);
        let _ = events_tx.try_send(RunEvent::RunError {
            message: message.to_string(),
        });
        let (result_tx, result_rx) = oneshot::channel();
        let _ = result_tx.send(RunResult::failed(message));
        Self::new(
            Uuid::new_v4().to_string(),
            events_rx,
            CancellationToken::new(),
            result_rx,
        )
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run's final result.
    ///
    /// Resolves once the run task has released its session.
    pub async fn result(&mut self) -> RunResult {
        match self.result.take() {
            Some(rx) => rx.await.unwrap_or_else(|_| RunResult::canceled()),
            None => RunResult::canceled(),
        }
    }
}

impl Stream for RunStream {
    type Item = RunEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RunEvent>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        this.events.poll_recv(cx)
    }
}

impl std::fmt::Debug for RunStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStream")
            .field("run_id", &self.run_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Starts runs against cached session agents.
///
/// Runs for the same session are serialized by the cache lease; runs for
/// different sessions proceed concurrently.
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    cache: SessionAgentCache,
}

impl RunCoordinator {
    pub fn new(cache: SessionAgentCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &SessionAgentCache {
        &self.cache
    }

    /// Start a run, waiting for any in-flight run on the same session.
    ///
    /// Agent construction failures surface here as `SessionInit` before any
    /// event is produced.
    pub async fn run(&self, request: RunRequest) -> Result<RunStream> {
        if let Some(stream) = reject_empty(&request) {
            return Ok(stream);
        }
        let lease = self
            .cache
            .acquire(&request.session_id, &request.model_id, &request.tool_config)
            .await?;
        Ok(self.spawn(lease, request))
    }

    /// Start a run, failing with `SessionBusy` when one is already in flight.
    pub async fn try_run(&self, request: RunRequest) -> Result<RunStream> {
        if let Some(stream) = reject_empty(&request) {
            return Ok(stream);
        }
        let lease = self
            .cache
            .try_acquire(&request.session_id, &request.model_id, &request.tool_config)
            .await?;
        Ok(self.spawn(lease, request))
    }

    fn spawn(&self, lease: SessionLease, request: RunRequest) -> RunStream {
        let run_id = Uuid::new_v4().to_string();
        let config = self.cache.config();
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (result_tx, result_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let task = RunTask {
            run_id: run_id.clone(),
            request,
            max_iterations: config.max_iterations,
            events: events_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(async move {
            let result = task.execute(lease).await;
            let _ = result_tx.send(result);
        });

        RunStream::new(run_id, events_rx, cancel, result_rx)
    }
}

fn reject_empty(request: &RunRequest) -> Option<RunStream> {
    if !request.prompt.trim().is_empty() || !request.attachments.is_empty() {
        return None;
    }
    tracing::warn!(session_id = %request.session_id, "rejecting request without a user message");
    Some(RunStream::rejected(NO_USER_MESSAGE))
}

struct RunTask {
    run_id: String,
    request: RunRequest,
    max_iterations: usize,
    events: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
}

impl RunTask {
    async fn execute(self, mut lease: SessionLease) -> RunResult {
        let session_id = self.request.session_id.clone();
        tracing::info!(session_id = %session_id, run_id = %self.run_id, model = lease.model_id(), "run started");

        let mut translator = EventTranslator::new(&session_id, &self.run_id);
        let (update_tx, mut update_rx) = mpsc::channel(UPDATE_BUFFER);

        let forward = async {
            self.emit(vec![translator.start()]).await;
            while let Some(update) = update_rx.recv().await {
                let events = translator.translate(update);
                self.emit(events).await;
            }
        };
        let updates = UpdateSink {
            tx: update_tx,
            cancel: self.cancel.clone(),
        };
        let driver = drive(&mut lease, &self.request, &self.run_id, self.max_iterations, updates);
        let ((), outcome) = tokio::join!(forward, driver);

        if !self.cancel.is_cancelled() {
            let closing = translator.finish(&outcome);
            self.emit(closing).await;
        }

        let result = match outcome {
            Ok(text) => {
                tracing::info!(session_id = %session_id, run_id = %self.run_id, "run finished");
                RunResult::completed(text)
            }
            Err(AiboxError::Cancelled) => {
                tracing::info!(session_id = %session_id, run_id = %self.run_id, "run cancelled");
                RunResult::canceled()
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, run_id = %self.run_id, error = %e, "run failed");
                RunResult::failed(e.to_string())
            }
        };
        drop(lease);
        result
    }

    /// Forward events in order; a closed receiver cancels the run.
    async fn emit(&self, events: Vec<RunEvent>) {
        for event in events {
            if self.cancel.is_cancelled() {
                return;
            }
            let sent = tokio::select! {
                _ = self.cancel.cancelled() => return,
                sent = self.events.send(event) => sent,
            };
            if sent.is_err() {
                tracing::debug!(run_id = %self.run_id, "event consumer went away; cancelling run");
                self.cancel.cancel();
                return;
            }
        }
    }
}

struct UpdateSink {
    tx: mpsc::Sender<AgentUpdate>,
    cancel: CancellationToken,
}

impl UpdateSink {
    async fn send(&self, update: AgentUpdate) -> Result<()> {
        let sent = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AiboxError::Cancelled),
            sent = self.tx.send(update) => sent,
        };
        sent.map_err(|_| {
            self.cancel.cancel();
            AiboxError::Cancelled
        })
    }
}

struct PendingCall {
    id: String,
    name: String,
    args: String,
    ended: bool,
}

/// The tool loop. Returns the assistant text of the run.
///
/// Works on a copy of the transcript and commits it to the agent only when
/// the run completes.
async fn drive(
    agent: &mut SessionAgent,
    request: &RunRequest,
    run_id: &str,
    max_iterations: usize,
    updates: UpdateSink,
) -> Result<String> {
    if agent.conversation_mut().reconcile(&request.history) {
        tracing::debug!(
            session_id = %request.session_id,
            messages = request.history.len(),
            "adopted client history"
        );
    }

    let mut transcript = agent.conversation().messages().to_vec();
    transcript.push(ModelMessage::user_with_attachments(
        request.prompt.clone(),
        &request.attachments,
    ));

    let provider = agent.provider().clone();
    let definitions = agent.tools().definitions();
    let mut assistant_text = String::new();

    for iteration in 1..=max_iterations {
        let provider_request = ProviderRequest {
            messages: transcript.clone(),
            tools: definitions.clone(),
        };
        let (turn_text, calls) = stream_turn(&provider, &provider_request, &updates).await?;
        assistant_text.push_str(&turn_text);

        tracing::debug!(
            run_id,
            iteration,
            tool_calls = calls.len(),
            text_len = turn_text.len(),
            "model turn complete"
        );

        if calls.is_empty() {
            transcript.push(ModelMessage::assistant(turn_text));
            agent.conversation_mut().commit(transcript);
            return Ok(assistant_text);
        }

        let mut content = Vec::with_capacity(calls.len() + 1);
        if !turn_text.is_empty() {
            content.push(ContentPart::Text { text: turn_text });
        }
        for call in &calls {
            content.push(ContentPart::ToolCall(AgentToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: ToolArguments::from_buffer(&call.args).raw().clone(),
            }));
        }
        transcript.push(ModelMessage::with_parts(Role::Assistant, content));

        for call in &calls {
            if updates.cancel.is_cancelled() {
                return Err(AiboxError::Cancelled);
            }
            agent.call_log().record(run_id, &call.id);
            let tool = agent.tools().get(&call.name).cloned();
            let ctx = ToolExecutionContext {
                session_id: request.session_id.clone(),
                run_id: run_id.to_string(),
                tool_call_id: call.id.clone(),
            };
            let (content, is_error) = tokio::select! {
                _ = updates.cancel.cancelled() => return Err(AiboxError::Cancelled),
                outcome = execute_tool(tool, call, &ctx) => outcome,
            };
            updates
                .send(AgentUpdate::ToolResult {
                    id: call.id.clone(),
                    content: content.clone(),
                    is_error,
                })
                .await?;
            transcript.push(ModelMessage::tool_result(call.id.clone(), content, is_error));
        }
    }

    Err(AiboxError::InvalidState(format!(
        "tool loop exceeded {max_iterations} iterations"
    )))
}

/// Stream one provider turn, forwarding deltas as agent updates.
///
/// Open calls are closed when the stream ends. A provider error returns
/// immediately and leaves them open; the run's `RunError` ends them.
async fn stream_turn(
    provider: &SharedProvider,
    request: &ProviderRequest,
    updates: &UpdateSink,
) -> Result<(String, Vec<PendingCall>)> {
    let provider_name = provider.provider_name().to_string();
    let as_provider_error = |e: AiboxError| match e {
        AiboxError::Cancelled | AiboxError::ModelProvider { .. } => e,
        other => AiboxError::provider(&provider_name, other.to_string()),
    };

    let mut stream = tokio::select! {
        _ = updates.cancel.cancelled() => return Err(AiboxError::Cancelled),
        stream = provider.stream_turn(request) => stream.map_err(as_provider_error)?,
    };

    let mut text = String::new();
    let mut calls: Vec<PendingCall> = Vec::new();
    loop {
        let delta = tokio::select! {
            _ = updates.cancel.cancelled() => return Err(AiboxError::Cancelled),
            delta = stream.next() => delta,
        };
        let Some(delta) = delta else { break };
        match delta.map_err(as_provider_error)? {
            ProviderDelta::Reasoning(delta) => {
                updates.send(AgentUpdate::Reasoning(delta)).await?;
            }
            ProviderDelta::Text(delta) => {
                text.push_str(&delta);
                updates.send(AgentUpdate::Text(delta)).await?;
            }
            ProviderDelta::ToolCallStart { id, name } => {
                if calls.iter().any(|c| c.id == id) {
                    tracing::warn!(tool_call_id = %id, "duplicate tool call start ignored");
                    continue;
                }
                calls.push(PendingCall {
                    id: id.clone(),
                    name: name.clone(),
                    args: String::new(),
                    ended: false,
                });
                updates.send(AgentUpdate::ToolCallStart { id, name }).await?;
            }
            ProviderDelta::ToolCallArgs { id, delta } => {
                let Some(call) = calls.iter_mut().find(|c| c.id == id && !c.ended) else {
                    tracing::warn!(tool_call_id = %id, "arguments for unknown tool call ignored");
                    continue;
                };
                call.args.push_str(&delta);
                updates.send(AgentUpdate::ToolCallArgs { id, delta }).await?;
            }
            ProviderDelta::ToolCallEnd { id } => {
                let Some(call) = calls.iter_mut().find(|c| c.id == id && !c.ended) else {
                    tracing::warn!(tool_call_id = %id, "end for unknown tool call ignored");
                    continue;
                };
                call.ended = true;
                updates.send(AgentUpdate::ToolCallEnd { id }).await?;
            }
        }
    }

    for call in calls.iter_mut().filter(|c| !c.ended) {
        call.ended = true;
        updates
            .send(AgentUpdate::ToolCallEnd {
                id: call.id.clone(),
            })
            .await?;
    }
    Ok((text, calls))
}

async fn execute_tool(
    tool: Option<Arc<dyn Tool>>,
    call: &PendingCall,
    ctx: &ToolExecutionContext,
) -> (serde_json::Value, bool) {
    let Some(tool) = tool else {
        tracing::warn!(tool = %call.name, "model called an unknown tool");
        return (
            serde_json::json!({ "error": format!("Tool '{}' not found", call.name) }),
            true,
        );
    };
    let args = ToolArguments::from_buffer(&call.args);
    match tool.execute(&args, ctx).await {
        Ok(value) => (value, false),
        Err(e) => {
            tracing::warn!(tool = %call.name, tool_call_id = %call.id, error = %e, "tool call failed");
            (serde_json::json!({ "error": e.to_string() }), true)
        }
    }
}

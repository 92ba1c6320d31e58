//! Drives reducers against an agent backend.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::message::Message;
use super::reducer::{Retraction, RunInput, RunState};
use super::store::{SharedThread, ThreadState, ThreadStore};
use crate::agent_loop::RunEvent;
use crate::error::{AiboxError, Result};
use crate::types::{Attachment, HistoryMessage};

/// Decoded events of one run.
pub type EventStream = BoxStream<'static, Result<RunEvent>>;

/// Transport to the server side. Dropping a run's stream cancels the run.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn start_run(&self, thread_id: &str, input: &RunInput) -> Result<EventStream>;

    /// Replace the server-held history of a session.
    async fn sync_history(&self, thread_id: &str, history: Vec<HistoryMessage>) -> Result<()>;

    /// Discard server-side state of a session.
    async fn clear_session(&self, thread_id: &str) -> Result<()>;
}

/// One conversation thread bound to a backend.
#[derive(Clone)]
pub struct ChatThread {
    thread_id: String,
    state: SharedThread,
    backend: Arc<dyn AgentBackend>,
}

impl ChatThread {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.reducer.messages().to_vec()
    }

    pub async fn state(&self) -> RunState {
        self.state.lock().await.reducer.state()
    }

    /// Send a user message and stream the reply to completion.
    ///
    /// Rejected while a run is streaming on this thread.
    pub async fn submit(
        &self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<RunState> {
        let text = text.into();
        let (input, cancel) = self
            .begin(|state| Some(state.reducer.submit(text, attachments)))
            .await?
            .ok_or_else(|| AiboxError::InvalidState("submit produced no run".into()))?;
        self.drive(input, cancel).await
    }

    /// Regenerate the last assistant message. `None` when there is nothing
    /// to regenerate.
    pub async fn reload(&self) -> Result<Option<RunState>> {
        match self.begin(|state| state.reducer.reload()).await? {
            Some((input, cancel)) => self.drive(input, cancel).await.map(Some),
            None => Ok(None),
        }
    }

    /// Stop the in-flight run, keeping its partial content.
    pub async fn cancel(&self) -> bool {
        let mut state = self.state.lock().await;
        let cancelled = state.reducer.cancel().is_some();
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        cancelled
    }

    /// Undo the last exchange and push the truncated history to the server.
    ///
    /// Returns the removed user text for re-editing.
    pub async fn retract(&self) -> Result<Option<Retraction>> {
        let retraction = self.state.lock().await.reducer.retract();
        if let Some(retraction) = &retraction {
            self.backend
                .sync_history(&self.thread_id, retraction.history.clone())
                .await?;
        }
        Ok(retraction)
    }

    async fn begin<F>(&self, start: F) -> Result<Option<(RunInput, CancellationToken)>>
    where
        F: FnOnce(&mut ThreadState) -> Option<RunInput>,
    {
        let mut state = self.state.lock().await;
        if state.reducer.is_streaming() {
            return Err(AiboxError::InvalidState(format!(
                "thread {} already has a run streaming",
                self.thread_id
            )));
        }
        let Some(input) = start(&mut *state) else {
            return Ok(None);
        };
        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());
        Ok(Some((input, cancel)))
    }

    async fn drive(&self, input: RunInput, cancel: CancellationToken) -> Result<RunState> {
        let ticket = input.ticket;
        let mut events = match self.backend.start_run(&self.thread_id, &input).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(thread_id = %self.thread_id, error = %e, "failed to start run");
                let mut state = self.state.lock().await;
                state.reducer.apply(
                    ticket,
                    &RunEvent::RunError {
                        message: e.to_string(),
                    },
                );
                state.cancel = None;
                return Err(e);
            }
        };

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = events.next() => next,
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    tracing::warn!(thread_id = %self.thread_id, error = %e, "run stream failed");
                    RunEvent::RunError {
                        message: e.to_string(),
                    }
                }
                None => RunEvent::RunFinished,
            };
            let terminal = event.is_terminal();
            tracing::trace!(thread_id = %self.thread_id, ?event, "applying run event");
            self.state.lock().await.reducer.apply(ticket, &event);
            if terminal {
                break;
            }
        }
        drop(events);

        let mut state = self.state.lock().await;
        if state.reducer.active_ticket().is_none() {
            state.cancel = None;
        }
        Ok(state.reducer.state())
    }
}

impl std::fmt::Debug for ChatThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatThread")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

/// Entry point for client code: threads by id over one backend.
#[derive(Clone)]
pub struct ChatClient {
    store: Arc<ThreadStore>,
    backend: Arc<dyn AgentBackend>,
}

impl ChatClient {
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        Self::with_store(Arc::new(ThreadStore::new()), backend)
    }

    pub fn with_store(store: Arc<ThreadStore>, backend: Arc<dyn AgentBackend>) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &Arc<ThreadStore> {
        &self.store
    }

    /// The thread for `thread_id`, created on first use.
    pub fn thread(&self, thread_id: &str) -> ChatThread {
        ChatThread {
            thread_id: thread_id.to_string(),
            state: self.store.get_or_create(thread_id),
            backend: self.backend.clone(),
        }
    }

    /// Clear a conversation locally and on the server.
    pub async fn clear(&self, thread_id: &str) -> Result<bool> {
        let existed = self.store.clear(thread_id).await;
        self.backend.clear_session(thread_id).await?;
        tracing::info!(thread_id, existed, "cleared conversation");
        Ok(existed)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("threads", &self.store.len())
            .finish()
    }
}

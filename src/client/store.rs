//! Thread-id keyed reducer store that outlives individual views.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use super::reducer::ClientRunReducer;

/// A thread's message log plus the cancel handle of its in-flight run.
#[derive(Debug, Default)]
pub struct ThreadState {
    pub reducer: ClientRunReducer,
    pub(crate) cancel: Option<CancellationToken>,
}

pub type SharedThread = Arc<tokio::sync::Mutex<ThreadState>>;

/// Holds every thread's state for the lifetime of the client.
///
/// Threads survive being dropped by their views and are removed only by
/// [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct ThreadStore {
    threads: Mutex<HashMap<String, SharedThread>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedThread>> {
        self.threads.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_or_create(&self, thread_id: &str) -> SharedThread {
        self.lock()
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    pub fn get(&self, thread_id: &str) -> Option<SharedThread> {
        self.lock().get(thread_id).cloned()
    }

    /// Drop a thread's state, cancelling its in-flight run.
    pub async fn clear(&self, thread_id: &str) -> bool {
        let removed = self.lock().remove(thread_id);
        let Some(thread) = removed else {
            return false;
        };
        let mut state = thread.lock().await;
        state.reducer.cancel();
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        true
    }

    pub fn thread_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Per-session agent cache with TTL eviction and model hot-swap.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tokio::time::Instant;
use uuid::Uuid;

use super::agent::{CallLog, CallLogEntry, SessionAgent};
use crate::config::AiboxConfig;
use crate::error::{AiboxError, Result};
use crate::provider::ProviderRegistry;
use crate::tools::{ToolConfig, ToolResolver};

type Slot = Option<SessionAgent>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct CacheEntry {
    session_id: String,
    slot: Arc<AsyncMutex<Slot>>,
    last_access: Mutex<Instant>,
    instance: Mutex<Option<Uuid>>,
    evicted: AtomicBool,
    call_log: CallLog,
}

impl CacheEntry {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            slot: Arc::new(AsyncMutex::new(None)),
            last_access: Mutex::new(Instant::now()),
            instance: Mutex::new(None),
            evicted: AtomicBool::new(false),
            call_log: CallLog::default(),
        }
    }

    fn touch(&self) {
        *lock(&self.last_access) = Instant::now();
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now > *lock(&self.last_access) + ttl
    }
}

/// Exclusive access to a session's agent for the duration of one run.
///
/// Dropping the lease releases the session and refreshes its last-access time.
pub struct SessionLease {
    agent: OwnedMappedMutexGuard<Slot, SessionAgent>,
    entry: Arc<CacheEntry>,
}

impl Deref for SessionLease {
    type Target = SessionAgent;

    fn deref(&self) -> &SessionAgent {
        &self.agent
    }
}

impl DerefMut for SessionLease {
    fn deref_mut(&mut self) -> &mut SessionAgent {
        &mut self.agent
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.entry.touch();
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.entry.session_id)
            .field("agent", &*self.agent)
            .finish()
    }
}

struct CacheInner {
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
    registry: Arc<ProviderRegistry>,
    resolver: Arc<ToolResolver>,
    config: AiboxConfig,
}

/// Owns one cached agent per session id.
///
/// At most one lease per session exists at any instant. Cheap to clone.
#[derive(Clone)]
pub struct SessionAgentCache {
    inner: Arc<CacheInner>,
}

impl SessionAgentCache {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        resolver: Arc<ToolResolver>,
        config: AiboxConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                registry,
                resolver,
                config,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.config.session_ttl()
    }

    pub fn config(&self) -> &AiboxConfig {
        &self.inner.config
    }

    pub fn resolver(&self) -> &Arc<ToolResolver> {
        &self.inner.resolver
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    /// Lease the agent for `session_id`, waiting for any in-flight run.
    ///
    /// Builds the agent when absent or expired, hot-swaps it when the model
    /// or tool configuration changed. Fails with `SessionInit` when the agent
    /// cannot be built; nothing is cached in that case.
    pub async fn acquire(
        &self,
        session_id: &str,
        model_id: &str,
        tool_config: &ToolConfig,
    ) -> Result<SessionLease> {
        loop {
            let entry = self.entry_for(session_id);
            let guard = entry.slot.clone().lock_owned().await;
            if entry.evicted.load(Ordering::Acquire) {
                continue;
            }
            return self.prepare(entry, guard, model_id, tool_config).await;
        }
    }

    /// Like [`acquire`](Self::acquire), but fails with `SessionBusy` instead
    /// of waiting.
    pub async fn try_acquire(
        &self,
        session_id: &str,
        model_id: &str,
        tool_config: &ToolConfig,
    ) -> Result<SessionLease> {
        loop {
            let entry = self.entry_for(session_id);
            let guard = entry
                .slot
                .clone()
                .try_lock_owned()
                .map_err(|_| AiboxError::SessionBusy(session_id.to_string()))?;
            if entry.evicted.load(Ordering::Acquire) {
                continue;
            }
            return self.prepare(entry, guard, model_id, tool_config).await;
        }
    }

    fn entry_for(&self, session_id: &str) -> Arc<CacheEntry> {
        lock(&self.inner.entries)
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(CacheEntry::new(session_id)))
            .clone()
    }

    async fn prepare(
        &self,
        entry: Arc<CacheEntry>,
        mut guard: OwnedMutexGuard<Slot>,
        model_id: &str,
        tool_config: &ToolConfig,
    ) -> Result<SessionLease> {
        let session_id = entry.session_id.as_str();

        if guard.is_some() && entry.is_expired(Instant::now(), self.ttl()) {
            tracing::info!(session_id, "cached agent expired; rebuilding");
            if let Some(stale) = guard.take() {
                self.discard(stale).await;
            }
        }

        let outcome = if guard.is_none() {
            match self.build(&entry, model_id, tool_config).await {
                Ok(agent) => {
                    *guard = Some(agent);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else if let Some(agent) = guard.as_mut() {
            self.reconfigure(agent, model_id, tool_config).await
        } else {
            Ok(())
        };

        if let Err(e) = outcome {
            tracing::warn!(session_id, model_id, error = %e, "session agent init failed");
            if guard.is_none() {
                self.detach(&entry);
            }
            return Err(AiboxError::session_init(session_id, &e));
        }

        *lock(&entry.instance) = guard.as_ref().map(SessionAgent::instance_id);
        entry.touch();

        let agent = OwnedMutexGuard::try_map(guard, |slot| slot.as_mut())
            .map_err(|_| AiboxError::InvalidState("session slot is empty".into()))?;
        Ok(SessionLease { agent, entry })
    }

    async fn build(
        &self,
        entry: &CacheEntry,
        model_id: &str,
        tool_config: &ToolConfig,
    ) -> Result<SessionAgent> {
        let provider = self
            .inner
            .registry
            .create_provider(model_id, &self.inner.config)?;
        let tools = self.inner.resolver.resolve(tool_config).await;
        tracing::info!(
            session_id = %entry.session_id,
            model_id,
            tools = tools.tools().len(),
            "built session agent"
        );
        Ok(SessionAgent::new(
            &entry.session_id,
            model_id,
            tool_config,
            provider,
            tools,
            self.inner.config.history_window,
            entry.call_log.clone(),
        ))
    }

    /// Apply a model or tool configuration change to a live agent.
    ///
    /// New connections are leased before old ones are released, so servers
    /// that stay enabled never see their reference count reach zero.
    async fn reconfigure(
        &self,
        agent: &mut SessionAgent,
        model_id: &str,
        tool_config: &ToolConfig,
    ) -> Result<()> {
        if agent.model_id() != model_id {
            let provider = self
                .inner
                .registry
                .create_provider(model_id, &self.inner.config)?;
            tracing::info!(
                session_id = agent.session_id(),
                from = agent.model_id(),
                to = model_id,
                "hot-swapping session model"
            );
            agent.swap_model(model_id, provider);
        }

        if agent.tool_config() != tool_config {
            let tools = self.inner.resolver.resolve(tool_config).await;
            let mut previous = agent.swap_tools(tool_config, tools);
            self.inner.resolver.release(previous.take_leases()).await;
            tracing::debug!(session_id = agent.session_id(), "reconciled session tool set");
        }
        Ok(())
    }

    async fn discard(&self, mut agent: SessionAgent) {
        self.inner.resolver.release(agent.tools.take_leases()).await;
    }

    /// Unlink `entry` from the map and mark it dead for any waiters.
    fn detach(&self, entry: &Arc<CacheEntry>) {
        entry.evicted.store(true, Ordering::Release);
        let mut entries = lock(&self.inner.entries);
        if entries
            .get(&entry.session_id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            entries.remove(&entry.session_id);
        }
    }

    /// Evict every idle entry whose last access is older than the TTL.
    ///
    /// Entries with a run in flight are skipped. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let ttl = self.ttl();
        let now = Instant::now();
        let candidates: Vec<Arc<CacheEntry>> = lock(&self.inner.entries)
            .values()
            .filter(|entry| entry.is_expired(now, ttl))
            .cloned()
            .collect();

        let mut evicted = 0;
        for entry in candidates {
            let Ok(mut guard) = entry.slot.clone().try_lock_owned() else {
                continue;
            };
            if !entry.is_expired(Instant::now(), ttl) {
                continue;
            }
            self.detach(&entry);
            if let Some(agent) = guard.take() {
                self.discard(agent).await;
            }
            tracing::info!(session_id = %entry.session_id, "evicted idle session agent");
            evicted += 1;
        }
        evicted
    }

    /// Drop the cached agent for `session_id`, waiting for any in-flight run.
    pub async fn evict(&self, session_id: &str) -> bool {
        let removed = lock(&self.inner.entries).remove(session_id);
        let Some(entry) = removed else {
            return false;
        };
        entry.evicted.store(true, Ordering::Release);
        let mut guard = entry.slot.clone().lock_owned().await;
        if let Some(agent) = guard.take() {
            self.discard(agent).await;
        }
        tracing::info!(session_id, "evicted session agent");
        true
    }

    /// Evict every entry.
    pub async fn shutdown(&self) {
        for session_id in self.session_ids() {
            self.evict(&session_id).await;
        }
    }

    /// Identity of the live cached agent, or `None` when absent or expired.
    pub fn instance_id(&self, session_id: &str) -> Option<Uuid> {
        let entries = lock(&self.inner.entries);
        let entry = entries.get(session_id)?;
        if entry.is_expired(Instant::now(), self.ttl()) {
            return None;
        }
        let instance = *lock(&entry.instance);
        instance
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.instance_id(session_id).is_some()
    }

    /// Tool calls executed against this session's entry, in order.
    pub fn call_log(&self, session_id: &str) -> Vec<CallLogEntry> {
        lock(&self.inner.entries)
            .get(session_id)
            .map(|entry| entry.call_log.entries())
            .unwrap_or_default()
    }

    pub fn session_ids(&self) -> Vec<String> {
        lock(&self.inner.entries).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionAgentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAgentCache")
            .field("sessions", &self.len())
            .field("ttl", &self.ttl())
            .finish()
    }
}

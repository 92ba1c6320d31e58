//! Reference-counted pool of tool-server connections.
//!
//! Connections are keyed by the fingerprint of the server configuration, so
//! sessions that use the same server share one live connection. A connection
//! is closed only when its last lease is released. Connecting holds only the
//! lock for that fingerprint, and every connect is bounded by a timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::ToolServerConfig;
use crate::error::{AiboxError, Result};
use crate::tools::{DynamicTool, DynamicToolProvider, ToolArguments, ToolExecutionContext};

/// A live connection to one tool server.
#[async_trait]
pub trait ToolServerConnection: Send + Sync {
    /// List the tools the server exposes, with server-local names.
    async fn list_tools(&self) -> Result<Vec<DynamicTool>>;

    /// Invoke one tool by its server-local name.
    async fn call_tool(&self, name: &str, arguments: serde_json::Value)
        -> Result<serde_json::Value>;

    /// Shut the connection down.
    async fn close(&self) -> Result<()>;
}

/// Opens connections to tool servers.
#[async_trait]
pub trait ToolServerConnector: Send + Sync {
    async fn connect(
        &self,
        server: &str,
        config: &ToolServerConfig,
    ) -> Result<Arc<dyn ToolServerConnection>>;
}

/// One reference to a pooled connection. Return it with [`ToolServerPool::release`].
pub struct ToolServerLease {
    server: String,
    fingerprint: String,
    provider: Arc<dyn DynamicToolProvider>,
}

impl std::fmt::Debug for ToolServerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolServerLease")
            .field("server", &self.server)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl ToolServerLease {
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Tool provider view of the connection.
    pub fn provider(&self) -> Arc<dyn DynamicToolProvider> {
        self.provider.clone()
    }
}

/// Connect attempts that take longer than this fail and degrade the tool set.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

struct PoolEntry {
    server: String,
    connection: Arc<dyn ToolServerConnection>,
    provider: Arc<dyn DynamicToolProvider>,
    refs: usize,
}

/// Per-fingerprint state. Its lock serializes connecting for one
/// configuration without blocking any other.
#[derive(Default)]
struct SlotState {
    live: Option<PoolEntry>,
    detached: bool,
}

type Slot = Arc<Mutex<SlotState>>;

/// Shared pool of tool-server connections.
pub struct ToolServerPool {
    connector: Arc<dyn ToolServerConnector>,
    slots: Mutex<HashMap<String, Slot>>,
    connect_timeout: Duration,
}

impl ToolServerPool {
    pub fn new(connector: Arc<dyn ToolServerConnector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Take a lease on the connection for `config`, connecting if none is open.
    ///
    /// Concurrent requests for the same configuration wait for one connect
    /// and share its result. Other configurations are never blocked.
    pub async fn acquire(&self, server: &str, config: &ToolServerConfig) -> Result<ToolServerLease> {
        let fingerprint = config.fingerprint();
        loop {
            let slot = self
                .slots
                .lock()
                .await
                .entry(fingerprint.clone())
                .or_default()
                .clone();
            let mut state = slot.lock().await;
            if state.detached {
                continue;
            }

            if let Some(entry) = state.live.as_mut() {
                entry.refs += 1;
                tracing::debug!(server, refs = entry.refs, "reusing tool server connection");
                return Ok(ToolServerLease {
                    server: server.to_string(),
                    fingerprint,
                    provider: entry.provider.clone(),
                });
            }

            let connection = match self.connect(server, config).await {
                Ok(connection) => connection,
                Err(e) => {
                    self.detach(&fingerprint, &slot, &mut state).await;
                    return Err(e);
                }
            };
            let provider: Arc<dyn DynamicToolProvider> = Arc::new(PooledProvider {
                server: server.to_string(),
                connection: connection.clone(),
            });
            tracing::info!(server, transport = %config.transport, "opened tool server connection");

            state.live = Some(PoolEntry {
                server: server.to_string(),
                connection,
                provider: provider.clone(),
                refs: 1,
            });
            return Ok(ToolServerLease {
                server: server.to_string(),
                fingerprint,
                provider,
            });
        }
    }

    async fn connect(
        &self,
        server: &str,
        config: &ToolServerConfig,
    ) -> Result<Arc<dyn ToolServerConnection>> {
        match tokio::time::timeout(self.connect_timeout, self.connector.connect(server, config)).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(e @ AiboxError::ToolServerConnection { .. })) => Err(e),
            Ok(Err(other)) => Err(AiboxError::tool_server(server, other.to_string())),
            Err(_) => Err(AiboxError::tool_server(
                server,
                format!("connect timed out after {:?}", self.connect_timeout),
            )),
        }
    }

    /// Unlink an empty slot so later acquires start from a fresh one.
    async fn detach(&self, fingerprint: &str, slot: &Slot, state: &mut SlotState) {
        state.detached = true;
        let mut slots = self.slots.lock().await;
        if slots
            .get(fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.remove(fingerprint);
        }
    }

    /// Return a lease; closes the connection when it was the last one.
    pub async fn release(&self, lease: ToolServerLease) {
        let slot = self.slots.lock().await.get(&lease.fingerprint).cloned();
        let Some(slot) = slot else {
            tracing::warn!(server = %lease.server, "released lease for unknown connection");
            return;
        };

        let closing = {
            let mut state = slot.lock().await;
            let Some(entry) = state.live.as_mut() else {
                tracing::warn!(server = %lease.server, "released lease for unknown connection");
                return;
            };
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs > 0 {
                return;
            }
            let closing = state.live.take();
            self.detach(&lease.fingerprint, &slot, &mut state).await;
            closing
        };

        if let Some(entry) = closing {
            tracing::info!(server = %entry.server, "closing tool server connection");
            if let Err(e) = entry.connection.close().await {
                tracing::warn!(server = %entry.server, error = %e, "tool server close failed");
            }
        }
    }

    /// Number of live leases on the connection for `config`.
    pub async fn ref_count(&self, config: &ToolServerConfig) -> usize {
        let slot = self.slots.lock().await.get(&config.fingerprint()).cloned();
        match slot {
            Some(slot) => slot.lock().await.live.as_ref().map_or(0, |entry| entry.refs),
            None => 0,
        }
    }

    /// Number of open connections.
    pub async fn open_connections(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut open = 0;
        for slot in slots {
            if slot.lock().await.live.is_some() {
                open += 1;
            }
        }
        open
    }
}

impl std::fmt::Debug for ToolServerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolServerPool").finish_non_exhaustive()
    }
}

/// Adapts a pooled connection to the dynamic tool interface.
struct PooledProvider {
    server: String,
    connection: Arc<dyn ToolServerConnection>,
}

impl std::fmt::Debug for PooledProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledProvider")
            .field("server", &self.server)
            .finish()
    }
}

#[async_trait]
impl DynamicToolProvider for PooledProvider {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>> {
        self.connection.list_tools().await
    }

    async fn execute_tool(
        &self,
        name: &str,
        args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value> {
        self.connection.call_tool(name, args.raw().clone()).await
    }
}

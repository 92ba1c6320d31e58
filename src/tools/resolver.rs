//! Merges the three tool tiers into one executable tool set per run.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use super::builtin;
use super::dynamic::DynamicToolAdapter;
use super::legacy::LegacyToolRegistry;
use super::tool::Tool;
use super::types::{ToolConfig, ToolTier};
use crate::config::{ToolServerConfig, ToolServerTransport};
use crate::error::AiboxError;
use crate::mcp::{ToolServerLease, ToolServerPool};
use crate::provider::ToolDefinition;

/// A tool server that was left out of a resolved tool set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedTool {
    pub server: String,
    pub reason: String,
}

/// Outcome of resolving a [`ToolConfig`].
///
/// Holds one pool lease per connected server. The leases must be handed back
/// through [`ToolResolver::release`] when the tool set is discarded.
#[derive(Default)]
pub struct ResolvedTools {
    tools: Vec<Arc<dyn Tool>>,
    leases: Vec<ToolServerLease>,
    degraded: Vec<DegradedTool>,
}

impl ResolvedTools {
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    pub fn degraded(&self) -> &[DegradedTool] {
        &self.degraded
    }

    pub fn leases(&self) -> &[ToolServerLease] {
        &self.leases
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Split off the leases, leaving the tools in place.
    pub fn take_leases(&mut self) -> Vec<ToolServerLease> {
        std::mem::take(&mut self.leases)
    }

    fn push(&mut self, tool: Arc<dyn Tool>, seen: &mut HashSet<String>) {
        if seen.insert(tool.name().to_string()) {
            self.tools.push(tool);
        } else {
            tracing::warn!(tool = tool.name(), tier = %tool.tier(), "duplicate tool name skipped");
        }
    }
}

impl std::fmt::Debug for ResolvedTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTools")
            .field("tools", &self.names())
            .field("leases", &self.leases.len())
            .field("degraded", &self.degraded)
            .finish()
    }
}

/// Every tool and tool server the resolver knows about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCatalog {
    pub tools: Vec<CatalogTool>,
    pub servers: Vec<CatalogServer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogTool {
    pub name: String,
    pub description: String,
    pub tier: ToolTier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogServer {
    pub name: String,
    pub transport: ToolServerTransport,
    pub enabled: bool,
}

/// Resolves per-session tool configuration into executable tools.
pub struct ToolResolver {
    builtins: Vec<Arc<dyn Tool>>,
    legacy: LegacyToolRegistry,
    servers: BTreeMap<String, ToolServerConfig>,
    pool: Arc<ToolServerPool>,
}

impl ToolResolver {
    /// A resolver with the standard built-ins, no local tools, and no servers.
    pub fn new(pool: Arc<ToolServerPool>) -> Self {
        Self {
            builtins: builtin::all_tools(),
            legacy: LegacyToolRegistry::new(),
            servers: BTreeMap::new(),
            pool,
        }
    }

    pub fn with_builtins(mut self, builtins: Vec<Arc<dyn Tool>>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn with_legacy(mut self, legacy: LegacyToolRegistry) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn with_servers(mut self, servers: BTreeMap<String, ToolServerConfig>) -> Self {
        self.servers = servers;
        self
    }

    pub fn pool(&self) -> &Arc<ToolServerPool> {
        &self.pool
    }

    /// Resolve `config` into a tool set: local functions, then built-ins,
    /// then remote tools in server-name order.
    ///
    /// The first tool to claim a name keeps it. Never fails: unknown local
    /// tool names are dropped and servers that cannot be reached are
    /// recorded as degraded.
    pub async fn resolve(&self, config: &ToolConfig) -> ResolvedTools {
        let mut resolved = ResolvedTools::default();
        if !config.enabled {
            return resolved;
        }
        let mut seen = HashSet::new();

        for name in &config.legacy_tools {
            match self.legacy.get(name) {
                Some(tool) => resolved.push(tool.clone(), &mut seen),
                None => tracing::warn!(tool = %name, "unknown local tool requested; skipping"),
            }
        }

        if config.builtin_enabled {
            for tool in &self.builtins {
                resolved.push(tool.clone(), &mut seen);
            }
        }

        if config.wants_remote() {
            for (server, server_config) in &self.servers {
                if server_config.disabled {
                    continue;
                }
                match self.resolve_server(server, server_config).await {
                    Ok((lease, tools)) => {
                        for tool in tools {
                            resolved.push(tool, &mut seen);
                        }
                        resolved.leases.push(lease);
                    }
                    Err(e) => {
                        tracing::warn!(server = %server, error = %e, "degraded tool set: server dropped");
                        resolved.degraded.push(DegradedTool {
                            server: server.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::debug!(
            tools = resolved.tools.len(),
            servers = resolved.leases.len(),
            degraded = resolved.degraded.len(),
            "resolved tool set"
        );
        resolved
    }

    async fn resolve_server(
        &self,
        server: &str,
        config: &ToolServerConfig,
    ) -> Result<(ToolServerLease, Vec<Arc<dyn Tool>>), AiboxError> {
        let lease = self.pool.acquire(server, config).await?;
        let provider = lease.provider();
        match provider.list_tools().await {
            Ok(tools) => {
                let tools = tools
                    .into_iter()
                    .map(|tool| {
                        Arc::new(DynamicToolAdapter::new(server, provider.clone(), tool)) as Arc<dyn Tool>
                    })
                    .collect();
                Ok((lease, tools))
            }
            Err(e) => {
                self.pool.release(lease).await;
                Err(AiboxError::tool_server(server, e.to_string()))
            }
        }
    }

    /// Hand leases back to the pool.
    pub async fn release(&self, leases: Vec<ToolServerLease>) {
        for lease in leases {
            self.pool.release(lease).await;
        }
    }

    /// List every known tool and configured server.
    pub fn catalog(&self) -> ToolCatalog {
        let tools = self
            .legacy
            .iter()
            .chain(self.builtins.iter())
            .map(|tool| CatalogTool {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                tier: tool.tier(),
            })
            .collect();
        let servers = self
            .servers
            .iter()
            .map(|(name, config)| CatalogServer {
                name: name.clone(),
                transport: config.transport,
                enabled: !config.disabled,
            })
            .collect();
        ToolCatalog { tools, servers }
    }
}

impl std::fmt::Debug for ToolResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolResolver")
            .field("builtins", &self.builtins.len())
            .field("legacy", &self.legacy)
            .field("servers", &self.servers.keys().collect::<Vec<_>>())
            .finish()
    }
}

//! aibox: agent session and streaming protocol core
//!
//! Serves conversational agent runs over a server-sent event stream. The
//! server side caches one agent per session (with TTL eviction and model
//! hot-swap), resolves its tool set from built-in, legacy, and remote tool
//! servers, and translates each run into an ordered event stream. The client
//! side folds that stream back into a navigable message log.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use aibox::prelude::*;
//!
//! # async fn example(registry: ProviderRegistry) -> aibox::error::Result<()> {
//! let config = AiboxConfig::load()?;
//! let resolver = ToolResolver::new(Arc::new(ToolServerPool::new(Arc::new(McpConnector))))
//!     .with_servers(config.mcp_servers.clone());
//! let service = AgentService::new(
//!     config,
//!     Arc::new(registry),
//!     Arc::new(resolver),
//!     Arc::new(InMemorySessionStore::new()),
//! );
//! let _sweeper = service.spawn_sweeper();
//!
//! let client = ChatClient::new(Arc::new(LocalBackend::new(service)));
//! let thread = client.thread("s1");
//! thread.submit("What's the weather in Tokyo?", Vec::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod client;
pub mod config;
pub mod error;
pub mod mcp;
pub mod prelude;
pub mod protocol;
pub mod provider;
pub mod server;
pub mod session;
pub mod tools;
pub mod types;

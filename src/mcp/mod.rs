//! Tool-server connections and the shared connection pool.

pub mod pool;

#[cfg(feature = "mcp")]
pub mod client;

pub use pool::{ToolServerConnection, ToolServerConnector, ToolServerLease, ToolServerPool};

#[cfg(feature = "mcp")]
pub use client::{McpConnection, McpConnector};

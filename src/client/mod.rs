//! Client side: run reducer, thread store, and backends.

pub mod backend;
pub mod controller;
pub mod message;
pub mod reducer;
pub mod store;

pub use backend::{HttpBackend, LocalBackend};
pub use controller::{AgentBackend, ChatClient, ChatThread, EventStream};
pub use message::{Message, ToolCall, ToolCallStatus};
pub use reducer::{ClientRunReducer, Retraction, RunInput, RunState, RunTicket};
pub use store::{SharedThread, ThreadState, ThreadStore};

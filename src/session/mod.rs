//! Session agents, their cache, and the session store.

pub mod agent;
pub mod cache;
pub mod conversation;
pub mod store;
pub mod sweeper;

pub use agent::{CallLog, CallLogEntry, SessionAgent};
pub use cache::{SessionAgentCache, SessionLease};
pub use conversation::Conversation;
pub use store::{InMemorySessionStore, SessionRecord, SessionStore};
pub use sweeper::{spawn_sweeper, SweeperHandle};

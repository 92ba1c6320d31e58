//! Server-side entry points.

pub mod request;
pub mod service;

pub use request::{ChatContent, ChatMessage, ChatPart, ChatRequest, NormalizedChat};
pub use service::{AgentService, ChatStream, FrameStream};

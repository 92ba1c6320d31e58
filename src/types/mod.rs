//! Shared conversation types.

pub mod message;

pub use message::*;

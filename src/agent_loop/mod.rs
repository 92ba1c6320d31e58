//! Agent loop primitives (runs, events, coordination).

pub mod events;
pub mod runner;
pub mod types;

pub use events::*;
pub use runner::*;
pub use types::*;

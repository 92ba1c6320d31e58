//! Tool system: capability trait, tiers, and per-run resolution.

pub mod arguments;
pub mod builtin;
pub mod dynamic;
pub mod legacy;
pub mod resolver;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use dynamic::{DynamicTool, DynamicToolAdapter, DynamicToolProvider};
pub use legacy::LegacyToolRegistry;
pub use resolver::{DegradedTool, ResolvedTools, ToolCatalog, ToolResolver};
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{AgentToolParameters, ToolConfig, ToolTier};

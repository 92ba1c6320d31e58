//! Model provider collaborator interface.
//!
//! Concrete HTTP clients live outside this crate. A provider only has to
//! stream one model turn as [`ProviderDelta`]s; the run coordinator owns
//! everything else.

pub mod registry;

pub use registry::{ProviderFactory, ProviderRegistry};

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ModelMessage;

/// A request for one model turn.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Raw callback vocabulary of a streaming model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderDelta {
    Reasoning(String),
    Text(String),
    ToolCallStart { id: String, name: String },
    ToolCallArgs { id: String, delta: String },
    ToolCallEnd { id: String },
}

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "bedrock", "openai").
    fn provider_name(&self) -> &str;

    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Stream one model turn. The turn ends when the stream ends.
    async fn stream_turn(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<ProviderDelta>>>;
}

/// Shared handle to a provider instance.
pub type SharedProvider = Arc<dyn ModelProvider>;

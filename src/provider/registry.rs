//! Provider registry for resolving model ids.

use std::collections::HashMap;
use std::sync::Arc;

use super::SharedProvider;
use crate::config::AiboxConfig;
use crate::error::{AiboxError, Result};

/// Factory for creating providers from a provider key + model ID.
pub trait ProviderFactory: Send + Sync {
    /// Provider key(s) this factory handles (e.g., &["bedrock", "anthropic"]).
    fn provider_keys(&self) -> &[&str];

    /// Create a provider for the given model ID.
    fn create(
        &self,
        config: &AiboxConfig,
        provider_key: &str,
        model_id: &str,
    ) -> Result<SharedProvider>;
}

/// Registry mapping provider keys to their factories.
///
/// Model ids take the form `provider:model`. A bare id is looked up as a
/// provider key of its own, so single-model factories can register the
/// model id directly.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for all provider keys it declares.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        for key in factory.provider_keys() {
            self.factories.insert(key.to_string(), factory.clone());
        }
    }

    /// Create a provider for a full model id.
    pub fn create_provider(&self, model_id: &str, config: &AiboxConfig) -> Result<SharedProvider> {
        let (provider_key, model) = model_id.split_once(':').unwrap_or((model_id, model_id));
        self.factories
            .get(provider_key)
            .ok_or_else(|| AiboxError::ModelNotFound(model_id.to_string()))?
            .create(config, provider_key, model)
    }

    /// Whether `model_id` names a registered provider.
    pub fn supports(&self, model_id: &str) -> bool {
        let provider_key = model_id.split_once(':').map_or(model_id, |(key, _)| key);
        self.has_provider(provider_key)
    }

    /// Check whether a factory is registered for the given key.
    pub fn has_provider(&self, provider_key: &str) -> bool {
        self.factories.contains_key(provider_key)
    }

    /// List all registered provider keys.
    pub fn provider_keys(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("provider_keys", &self.provider_keys())
            .finish()
    }
}

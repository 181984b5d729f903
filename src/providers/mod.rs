mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use crate::config::ProviderConfig;
use crate::engine::ExecutionContext;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// ============================================================================
// Provider Trait
// ============================================================================

/// Model capability invoked by `llm` steps.
///
/// The context is read-only; providers typically look their API key up in
/// [`ExecutionContext::secret`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value>;

    fn name(&self) -> &str;
}

// ============================================================================
// Registry
// ============================================================================

/// Provider name → capability, injected into the engine.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn with(mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(name, provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn LlmProvider>> {
        self.providers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Build OpenAI-compatible providers for every configured entry.
    pub fn from_config(providers: &BTreeMap<String, ProviderConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in providers {
            let api_key_secret = config
                .api_key_secret
                .clone()
                .unwrap_or_else(|| name.clone());
            registry.register(
                name.clone(),
                Arc::new(OpenAiCompatProvider::new(
                    name.clone(),
                    config.base_url.clone(),
                    api_key_secret,
                )),
            );
        }
        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

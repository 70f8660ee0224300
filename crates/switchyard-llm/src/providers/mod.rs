//! Provider clients
//!
//! The router only depends on [`ProviderClient`]. Each provider in the
//! closed set gets at most one live client, built once from environment
//! credentials; a provider without credentials is simply absent from the
//! [`ProviderRegistry`].

use crate::completion::ProviderResponse;
use crate::config::{ModelConfig, ProviderConfig, ProviderKind};
use crate::error::Result;
use crate::message::Message;
use crate::sanitize::ProviderParams;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Gemini generateContent client
pub mod gemini;
/// Scripted client for tests
pub mod mock;
/// OpenAI-compatible client (Azure OpenAI, OpenRouter)
pub mod openai_compat;

pub use gemini::GeminiClient;
pub use mock::{MockProvider, MockReply, RecordedCall};
pub use openai_compat::OpenAiCompatClient;

/// One invocation of one candidate model
#[derive(Debug, Clone, Copy)]
pub struct InvocationRequest<'a> {
    /// Model key of the candidate
    pub model_key: &'a str,
    /// Model config of the candidate
    pub model: &'a ModelConfig,
    /// Conversation
    pub messages: &'a [Message],
    /// Sanitized parameters
    pub params: &'a ProviderParams,
    /// Network timeout for this invocation
    pub timeout: Duration,
}

/// Trait for provider clients
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider served by this client
    fn kind(&self) -> ProviderKind;

    /// Send the conversation to the model and return its completion
    async fn invoke(&self, request: &InvocationRequest<'_>) -> Result<ProviderResponse>;
}

/// Live clients by provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("available", &self.available())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one client per provider whose credentials are present
    pub fn from_env(providers: &BTreeMap<ProviderKind, ProviderConfig>) -> Result<Self> {
        let mut registry = Self::new();

        for (kind, config) in providers {
            if !config.enabled {
                debug!(provider = %kind, "Provider disabled");
                continue;
            }

            let Some(api_key) = env_value(&config.api_key_env) else {
                info!(
                    provider = %kind,
                    env = %config.api_key_env,
                    "Provider unavailable: credentials not set"
                );
                continue;
            };

            let client: Arc<dyn ProviderClient> = match kind {
                ProviderKind::Azure => {
                    let endpoint = config
                        .endpoint_env
                        .as_deref()
                        .and_then(env_value)
                        .or_else(|| config.base_url.clone());
                    let Some(endpoint) = endpoint else {
                        warn!(provider = %kind, "Provider unavailable: endpoint not set");
                        continue;
                    };
                    Arc::new(OpenAiCompatClient::azure(api_key, endpoint, config)?)
                }
                ProviderKind::OpenRouter => Arc::new(OpenAiCompatClient::openrouter(api_key, config)?),
                ProviderKind::Gemini => Arc::new(GeminiClient::new(api_key, config)?),
            };

            info!(provider = %kind, "Registered provider client");
            registry.clients.insert(*kind, client);
        }

        Ok(registry)
    }

    /// Register a client, replacing any previous one for its provider
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        let kind = client.kind();
        debug!(provider = %kind, "Registering provider client");
        self.clients.insert(kind, client);
    }

    /// Get the client for a provider
    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&kind).cloned()
    }

    /// Providers with a live client, in stable order
    #[must_use]
    pub fn available(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.clients.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn timeout_from(config: &ProviderConfig) -> Duration {
    Duration::from_millis(config.timeout_ms.unwrap_or(120_000))
}

fn network_error(err: reqwest::Error, timeout: Duration) -> crate::error::Error {
    if err.is_timeout() {
        crate::error::Error::Timeout(timeout.as_millis() as u64)
    } else {
        crate::error::Error::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_leave_provider_unavailable() {
        let mut providers = BTreeMap::new();
        providers.insert(
            ProviderKind::OpenRouter,
            ProviderConfig::new("SWITCHYARD_TEST_UNSET_OPENROUTER_KEY"),
        );

        let registry = ProviderRegistry::from_env(&providers).unwrap();
        assert!(registry.get(ProviderKind::OpenRouter).is_none());
        assert!(registry.available().is_empty());
    }

    #[test]
    fn test_register_replaces_client() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new(ProviderKind::Azure)));
        registry.register(Arc::new(MockProvider::new(ProviderKind::Azure)));
        registry.register(Arc::new(MockProvider::new(ProviderKind::Gemini)));

        assert_eq!(
            registry.available(),
            vec![ProviderKind::Azure, ProviderKind::Gemini]
        );
    }
}

//! Remote model backends and the credentials that unlock them.

pub mod gemini;
mod http;
pub mod qwen;

pub use gemini::GeminiBackend;
pub use qwen::QwenBackend;

use crate::config::ProvidersConfig;
use crate::defaults;
use crate::gateway::ProviderRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// API keys per provider id, resolved once at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads each provider's key from its configured environment variable.
    pub fn from_env(providers: &ProvidersConfig) -> Self {
        let mut credentials = Self::new();
        for provider in [defaults::GEMINI_PROVIDER, defaults::QWEN_PROVIDER] {
            let var = providers.api_key_env(provider);
            if let Ok(key) = std::env::var(&var)
                && !key.trim().is_empty()
            {
                credentials = credentials.with_key(provider, key.trim());
            }
        }
        credentials
    }

    pub fn with_key(mut self, provider: &str, key: &str) -> Self {
        self.keys.insert(provider.to_lowercase(), key.to_string());
        self
    }

    pub fn key(&self, provider: &str) -> Option<&str> {
        self.keys.get(&provider.to_lowercase()).map(String::as_str)
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("providers", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registers an HTTP backend for every provider that has a key.
pub fn build_registry(credentials: &Credentials, providers: &ProvidersConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    if let Some(key) = credentials.key(defaults::GEMINI_PROVIDER) {
        let mut backend = GeminiBackend::new(key.to_string());
        if let Some(url) = providers.base_url(defaults::GEMINI_PROVIDER) {
            backend = backend.with_base_url(url);
        }
        registry.register(Arc::new(backend));
    }

    if let Some(key) = credentials.key(defaults::QWEN_PROVIDER) {
        let mut backend = QwenBackend::new(key.to_string());
        if let Some(url) = providers.base_url(defaults::QWEN_PROVIDER) {
            backend = backend.with_base_url(url);
        }
        registry.register(Arc::new(backend));
    }

    let registered: Vec<&str> = registry.providers().collect();
    tracing::info!("Registered model providers: {:?}", registered);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_keys() {
        let credentials = Credentials::new().with_key("gemini", "secret-123");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("gemini"));
        assert!(!debug.contains("secret-123"));
    }

    #[test]
    fn test_registry_only_for_keyed_providers() {
        let credentials = Credentials::new().with_key("Qwen", "k");
        let registry = build_registry(&credentials, &ProvidersConfig::default());
        assert!(registry.get("qwen").is_some());
        assert!(registry.get("gemini").is_none());
    }

    #[test]
    fn test_empty_credentials_empty_registry() {
        let registry = build_registry(&Credentials::new(), &ProvidersConfig::default());
        assert!(registry.is_empty());
    }
}

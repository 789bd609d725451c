use crate::gateway::backend::ModelBackend;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Backends keyed by provider id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    backends: BTreeMap<String, Arc<dyn ModelBackend>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `backend` under its own provider id, replacing any previous entry.
    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        self.backends
            .insert(backend.provider().to_lowercase(), backend);
    }

    pub fn with_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.get(&provider.to_lowercase()).cloned()
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::backend::MockBackend;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ProviderRegistry::new().with_backend(Arc::new(MockBackend::new("Gemini")));
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("GEMINI").is_some());
        assert!(registry.get("qwen").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockBackend::new("qwen")));
        registry.register(Arc::new(MockBackend::new("qwen")));
        assert_eq!(registry.providers().collect::<Vec<_>>(), vec!["qwen"]);
        assert!(!registry.is_empty());
    }
}

use crate::config::GatewayConfig;
use crate::gateway::backend::ModelBackend;
use crate::gateway::catalog::{self, ModelCatalog, ProviderConfig};
use crate::gateway::error::GatewayError;
use crate::gateway::registry::ProviderRegistry;
use crate::gateway::retry::RetryPolicy;
use crate::gateway::types::{GenerationRequest, GenerationResult, TokenUsage};
use crate::gateway::usage::{UsageKey, UsageLedger};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Uniform entry point for every model call.
///
/// Resolves the model through the catalog, picks the backend from the
/// registry and runs the attempt loop: per-attempt timeout, retry policy,
/// gateway-wide concurrency cap and usage accounting.
pub struct Gateway {
    registry: ProviderRegistry,
    catalog: ModelCatalog,
    policy: RetryPolicy,
    timeout: Duration,
    permits: Semaphore,
    usage: UsageLedger,
}

impl Gateway {
    pub fn new(registry: ProviderRegistry, catalog: ModelCatalog, config: &GatewayConfig) -> Self {
        Self {
            registry,
            catalog,
            policy: RetryPolicy::from_config(config),
            timeout: Duration::from_secs(config.request_timeout_secs),
            permits: Semaphore::new(config.max_concurrent_requests.max(1)),
            usage: UsageLedger::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn usage(&self) -> &UsageLedger {
        &self.usage
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model(&self, api_name: &str) -> Result<&ProviderConfig, GatewayError> {
        self.catalog
            .get(api_name)
            .ok_or_else(|| GatewayError::UnknownModel {
                model: api_name.to_string(),
            })
    }

    fn backend_for(&self, config: &ProviderConfig) -> Result<Arc<dyn ModelBackend>, GatewayError> {
        self.registry
            .get(&config.provider)
            .ok_or_else(|| GatewayError::UnknownProvider {
                provider: config.provider.clone(),
            })
    }

    pub fn estimate_cost(&self, tokens_in: u64, tokens_out: u64, config: &ProviderConfig) -> f64 {
        catalog::estimate_cost(tokens_in, tokens_out, config)
    }

    /// Token estimate for `text` on `model`, from that model's backend.
    pub fn count_tokens(&self, text: &str, model: &str) -> Result<u64, GatewayError> {
        let config = self.model(model)?;
        let backend = self.backend_for(config)?;
        Ok(backend.count_tokens(text, config))
    }

    /// Runs `request` with retries and returns text plus accounting.
    ///
    /// Transient and rate-limit failures are retried per the policy; every
    /// other failure returns after the first attempt. The ledger is updated
    /// once per call, on success or final failure.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GatewayError> {
        let config = self.model(&request.model)?;
        if request.has_audio() && !config.supports_audio {
            return Err(GatewayError::invalid_request(format!(
                "model {} does not accept audio input",
                config.api_name
            )));
        }
        let backend = self.backend_for(config)?;
        let key = UsageKey::new(&config.provider, &config.api_name);
        let started = Instant::now();
        let mut retries = 0u32;

        loop {
            let attempt = retries + 1;
            let outcome = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| GatewayError::transient("gateway is shutting down"))?;
                match tokio::time::timeout(self.timeout, backend.generate(request, config)).await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::transient(format!(
                        "no response within {}s",
                        self.timeout.as_secs_f64()
                    ))),
                }
            };

            match outcome {
                Ok(output) => {
                    let usage = output.usage.unwrap_or_else(|| TokenUsage {
                        input_tokens: backend.count_tokens(&request.prompt_text(), config),
                        output_tokens: backend.count_tokens(&output.text, config),
                    });
                    let cost = self.estimate_cost(usage.input_tokens, usage.output_tokens, config);
                    self.usage.record_success(
                        &key,
                        attempt,
                        usage.input_tokens,
                        usage.output_tokens,
                        cost,
                    );
                    tracing::debug!(
                        label = %request.label,
                        model = %config.api_name,
                        attempts = attempt,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        cost,
                        "Generation succeeded"
                    );
                    return Ok(GenerationResult {
                        text: output.text,
                        provider: config.provider.clone(),
                        model: config.api_name.clone(),
                        usage,
                        cost,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                Err(error) if self.policy.should_retry(&error, retries) => {
                    let delay = self.policy.backoff(retries, &error);
                    tracing::warn!(
                        label = %request.label,
                        model = %config.api_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after {}",
                        error
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(error) => {
                    self.usage.record_failure(&key, attempt);
                    tracing::warn!(
                        label = %request.label,
                        model = %config.api_name,
                        attempts = attempt,
                        kind = %error.kind(),
                        "Generation failed: {}",
                        error
                    );
                    return Err(error);
                }
            }
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("models", &self.catalog.len())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::backend::{MockBackend, MockReply};

    fn catalog() -> ModelCatalog {
        ModelCatalog::from_configs([
            ProviderConfig::new("mock", "audio-model", "Audio", 1.0, 2.0).with_audio(),
            ProviderConfig::new("mock", "text-model", "Text", 1.0, 2.0),
            ProviderConfig::new("ghost", "ghost-model", "Ghost", 1.0, 1.0),
        ])
    }

    fn gateway(backend: Arc<MockBackend>, max_retries: u32) -> Gateway {
        let registry = ProviderRegistry::new().with_backend(backend);
        Gateway::new(registry, catalog(), &GatewayConfig::default())
            .with_retry_policy(RetryPolicy::immediate(max_retries))
    }

    #[tokio::test]
    async fn test_success_records_usage() {
        let backend = Arc::new(MockBackend::new("mock").with_response("one two three"));
        let gw = gateway(Arc::clone(&backend), 3);
        let result = gw
            .generate(&GenerationRequest::text("text-model", "a b"))
            .await
            .unwrap();
        assert_eq!(result.text, "one two three");
        assert_eq!(result.attempts, 1);
        assert_eq!(result.usage.input_tokens, 2);
        assert_eq!(result.usage.output_tokens, 3);
        assert!((result.cost - (2.0 / 1e6 + 6.0 / 1e6)).abs() < 1e-12);

        let snap = gw.usage().snapshot();
        assert_eq!(snap[&UsageKey::new("mock", "text-model")].calls, 1);
    }

    #[tokio::test]
    async fn test_transient_retried_until_success() {
        let backend = Arc::new(MockBackend::new("mock").on_sequence(
            None,
            None,
            vec![
                MockReply::Fail(GatewayError::transient("503")),
                MockReply::Fail(GatewayError::rate_limited("429")),
                MockReply::text("ok"),
            ],
        ));
        let gw = gateway(Arc::clone(&backend), 3);
        let result = gw
            .generate(&GenerationRequest::text("text-model", "x"))
            .await
            .unwrap();
        assert_eq!(result.attempts, 3);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_auth_not_retried() {
        let backend = Arc::new(MockBackend::new("mock").with_failure(GatewayError::auth("bad")));
        let gw = gateway(Arc::clone(&backend), 3);
        let err = gw
            .generate(&GenerationRequest::text("text-model", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(gw.usage().total().failed_calls, 1);
    }

    #[tokio::test]
    async fn test_audio_on_text_model_rejected_without_call() {
        let backend = Arc::new(MockBackend::new("mock"));
        let gw = gateway(Arc::clone(&backend), 3);
        let request = GenerationRequest::text("text-model", "x").with_audio(vec![0; 8]);
        let err = gw.generate(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_and_provider() {
        let gw = gateway(Arc::new(MockBackend::new("mock")), 0);
        let err = gw
            .generate(&GenerationRequest::text("nope", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownModel { .. }));

        let err = gw
            .generate(&GenerationRequest::text("ghost-model", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownProvider { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_transient_and_retried() {
        let backend = Arc::new(MockBackend::new("mock").with_latency(Duration::from_millis(200)));
        let gw = gateway(Arc::clone(&backend), 1).with_timeout(Duration::from_millis(10));
        let err = gw
            .generate(&GenerationRequest::text("text-model", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_count_tokens_uses_backend() {
        let gw = gateway(Arc::new(MockBackend::new("mock")), 0);
        assert_eq!(gw.count_tokens(&"a".repeat(10), "text-model").unwrap(), 4);
        assert!(gw.count_tokens("x", "missing").is_err());
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let backend = Arc::new(MockBackend::new("mock").with_latency(Duration::from_millis(20)));
        let config = GatewayConfig {
            max_concurrent_requests: 2,
            ..GatewayConfig::default()
        };
        let registry = ProviderRegistry::new().with_backend(backend.clone());
        let gw = Gateway::new(registry, catalog(), &config);
        let request = GenerationRequest::text("text-model", "x");
        let calls = (0..6).map(|_| gw.generate(&request));
        let results = futures_util::future::join_all(calls).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(backend.max_in_flight() <= 2);
    }
}

//! Retry bounds of the model gateway.

use proposal_engine::config::GatewayConfig;
use proposal_engine::gateway::{
    Gateway, GatewayError, GenerationRequest, MockBackend, MockReply, ModelCatalog,
    ProviderRegistry, RetryPolicy, UsageKey,
};
use std::sync::Arc;
use std::time::Duration;

const MODEL: &str = "gemini-2.5-flash";

fn gateway(backend: Arc<MockBackend>, retries: u32) -> Gateway {
    Gateway::new(
        ProviderRegistry::new().with_backend(backend),
        ModelCatalog::builtin(),
        &GatewayConfig::default(),
    )
    .with_retry_policy(RetryPolicy::immediate(retries))
}

fn request() -> GenerationRequest {
    GenerationRequest::text(MODEL, "Summarise the meeting.").with_label("retry-test")
}

#[tokio::test]
async fn test_transient_failures_stop_after_max_retries() {
    for retries in [0, 1, 3] {
        let backend = Arc::new(
            MockBackend::new("gemini").with_failure(GatewayError::transient("503 from upstream")),
        );
        let gateway = gateway(backend.clone(), retries);

        let err = gateway.generate(&request()).await.unwrap_err();

        assert!(matches!(err, GatewayError::Transient { .. }), "{err:?}");
        assert_eq!(backend.call_count(), retries as usize + 1);
    }
}

#[tokio::test]
async fn test_invalid_request_is_attempted_once() {
    let backend = Arc::new(
        MockBackend::new("gemini").with_failure(GatewayError::invalid_request("prompt too long")),
    );
    let gateway = gateway(backend.clone(), 5);

    let err = gateway.generate(&request()).await.unwrap_err();

    assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_auth_failure_is_attempted_once() {
    let backend =
        Arc::new(MockBackend::new("gemini").with_failure(GatewayError::auth("key revoked")));
    let gateway = gateway(backend.clone(), 5);

    let err = gateway.generate(&request()).await.unwrap_err();

    assert!(matches!(err, GatewayError::Auth { .. }));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_recovers_on_last_allowed_attempt() {
    let backend = Arc::new(MockBackend::new("gemini").on_sequence(
        None,
        None,
        vec![
            MockReply::Fail(GatewayError::transient("reset")),
            MockReply::Fail(GatewayError::rate_limited("slow down")),
            MockReply::text("done"),
        ],
    ));
    let gateway = gateway(backend.clone(), 2);

    let result = gateway.generate(&request()).await.unwrap();

    assert_eq!(result.text, "done");
    assert_eq!(result.attempts, 3);
    assert_eq!(backend.call_count(), 3);

    let totals = gateway.usage().snapshot();
    let entry = totals.get(&UsageKey::new("gemini", MODEL)).unwrap();
    assert_eq!(entry.calls, 1);
    assert_eq!(entry.attempts, 3);
    assert_eq!(entry.failed_calls, 0);
}

#[tokio::test]
async fn test_slow_attempts_time_out_as_transient() {
    let backend =
        Arc::new(MockBackend::new("gemini").with_latency(Duration::from_millis(200)));
    let gateway = gateway(backend.clone(), 1).with_timeout(Duration::from_millis(20));

    let err = gateway.generate(&request()).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(backend.call_count(), 2);
    let total = gateway.usage().total();
    assert_eq!(total.failed_calls, 1);
}

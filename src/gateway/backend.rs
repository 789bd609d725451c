use crate::gateway::catalog::ProviderConfig;
use crate::gateway::error::GatewayError;
use crate::gateway::tokens;
use crate::gateway::types::{GenerationOutput, GenerationRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A model provider the Gateway can call.
///
/// Implementations perform exactly one attempt per `generate` call; retries,
/// timeouts and accounting belong to the Gateway.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Registry key, e.g. `gemini`.
    fn provider(&self) -> &str;

    /// Run one generation attempt against `model`.
    async fn generate(
        &self,
        request: &GenerationRequest,
        model: &ProviderConfig,
    ) -> Result<GenerationOutput, GatewayError>;

    /// Offline token estimate for `text` on `model`.
    fn count_tokens(&self, text: &str, _model: &ProviderConfig) -> u64 {
        tokens::estimate_gemini_tokens(text)
    }
}

/// Implement ModelBackend for Arc<T> so one backend can sit in several registries.
#[async_trait]
impl<T: ModelBackend + ?Sized> ModelBackend for Arc<T> {
    fn provider(&self) -> &str {
        (**self).provider()
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        model: &ProviderConfig,
    ) -> Result<GenerationOutput, GatewayError> {
        (**self).generate(request, model).await
    }

    fn count_tokens(&self, text: &str, model: &ProviderConfig) -> u64 {
        (**self).count_tokens(text, model)
    }
}

/// Scripted outcome of one mock call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    Fail(GatewayError),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }
}

#[derive(Debug)]
struct MockRule {
    model: Option<String>,
    needle: Option<String>,
    /// Replies consumed in order; the last one repeats forever.
    replies: VecDeque<MockReply>,
}

impl MockRule {
    fn matches(&self, request: &GenerationRequest, prompt: &str) -> bool {
        self.model.as_deref().is_none_or(|m| m == request.model)
            && self.needle.as_deref().is_none_or(|n| prompt.contains(n))
    }

    fn next_reply(&mut self) -> Option<MockReply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

/// One call seen by a [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub label: String,
    pub prompt: String,
    pub has_audio: bool,
}

/// Scriptable backend for tests.
///
/// Rules are matched in insertion order against the request's model and
/// prompt text; the first match answers. Unmatched calls get the fallback.
#[derive(Debug)]
pub struct MockBackend {
    provider: String,
    fallback: MockReply,
    latency: Duration,
    rules: Mutex<Vec<MockRule>>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockBackend {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            fallback: MockReply::text("mock response"),
            latency: Duration::ZERO,
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Reply for calls no rule matches.
    pub fn with_response(mut self, text: &str) -> Self {
        self.fallback = MockReply::text(text);
        self
    }

    /// Fail every call no rule matches.
    pub fn with_failure(mut self, error: GatewayError) -> Self {
        self.fallback = MockReply::Fail(error);
        self
    }

    /// Simulated per-call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer every call to `model`.
    pub fn on_model(self, model: &str, reply: MockReply) -> Self {
        self.on_sequence(Some(model), None, vec![reply])
    }

    /// Answer every call whose prompt contains `needle`.
    pub fn on_prompt(self, needle: &str, reply: MockReply) -> Self {
        self.on_sequence(None, Some(needle), vec![reply])
    }

    /// Answer matching calls with `replies` in order, repeating the last.
    pub fn on_sequence(
        self,
        model: Option<&str>,
        needle: Option<&str>,
        replies: Vec<MockReply>,
    ) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(MockRule {
                model: model.map(str::to_string),
                needle: needle.map(str::to_string),
                replies: replies.into(),
            });
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn pick_reply(&self, request: &GenerationRequest, prompt: &str) -> MockReply {
        let scripted = self.rules.lock().ok().and_then(|mut rules| {
            rules
                .iter_mut()
                .find(|r| r.matches(request, prompt))
                .and_then(MockRule::next_reply)
        });
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _model: &ProviderConfig,
    ) -> Result<GenerationOutput, GatewayError> {
        let prompt = request.prompt_text();
        let reply = self.pick_reply(request, &prompt);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                model: request.model.clone(),
                label: request.label.clone(),
                prompt: prompt.clone(),
                has_audio: request.has_audio(),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Decrements even when the caller times out mid-sleep.
        let _in_flight = InFlight(&self.in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            MockReply::Text(text) => {
                let input = prompt.split_whitespace().count() as u64;
                let output = text.split_whitespace().count() as u64;
                Ok(GenerationOutput::new(text).with_usage(input, output))
            }
            MockReply::Fail(error) => Err(error),
        }
    }
}

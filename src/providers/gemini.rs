//! Google Gemini `generateContent` backend.

use crate::gateway::{
    GatewayError, GenerationOutput, GenerationRequest, ModelBackend, Part, ProviderConfig,
    tokens,
};
use crate::providers::http;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Builds the `generateContent` body; audio parts are sent inline as base64.
pub(crate) fn request_body(request: &GenerationRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::Audio { mime_type, data } => json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": STANDARD.encode(data),
                }
            }),
        })
        .collect();

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "temperature": request.sampling.temperature,
            "topP": request.sampling.top_p,
            "maxOutputTokens": request.sampling.max_output_tokens,
        }
    })
}

pub(crate) fn parse_response(body: &Value) -> Result<GenerationOutput, GatewayError> {
    let candidate = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .ok_or_else(|| {
            let reason = body
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates returned");
            GatewayError::invalid_request(format!("prompt rejected: {reason}"))
        })?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN");
        return Err(GatewayError::transient(format!(
            "empty response (finish reason {reason})"
        )));
    }

    let mut output = GenerationOutput::new(text);
    if let Some(usage) = body.get("usageMetadata") {
        let count = |field: &str| usage.get(field).and_then(Value::as_u64).unwrap_or(0);
        output = output.with_usage(count("promptTokenCount"), count("candidatesTokenCount"));
    }
    Ok(output)
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn provider(&self) -> &str {
        crate::defaults::GEMINI_PROVIDER
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        model: &ProviderConfig,
    ) -> Result<GenerationOutput, GatewayError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| GatewayError::auth("API key contains invalid characters"))?;
        headers.insert("x-goog-api-key", key);

        let body = request_body(request);
        let response =
            http::post_json(&self.client, &self.endpoint(&model.api_name), headers, &body).await?;
        parse_response(&response)
    }

    fn count_tokens(&self, text: &str, _model: &ProviderConfig) -> u64 {
        tokens::estimate_gemini_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_with_audio() {
        let request = GenerationRequest::text("gemini-2.5-pro", "transcribe this")
            .with_audio(vec![1, 2, 3]);
        let body = request_body(&request);
        let parts = body.pointer("/contents/0/parts").unwrap().as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], "transcribe this");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "audio/wav");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 16384);
    }

    #[test]
    fn test_parse_response_with_usage() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello " }, { "text": "world" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3 }
        });
        let output = parse_response(&body).unwrap();
        assert_eq!(output.text, "Hello world");
        let usage = output.usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn test_parse_response_blocked_prompt() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_response(&body).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_response_empty_text_is_transient() {
        let body = json!({ "candidates": [{ "content": { "parts": [] }, "finishReason": "MAX_TOKENS" }] });
        let err = parse_response(&body).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_endpoint() {
        let backend = GeminiBackend::new("k".to_string()).with_base_url("http://localhost:8080/");
        assert_eq!(
            backend.endpoint("gemini-2.5-pro"),
            "http://localhost:8080/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert!(!format!("{backend:?}").contains("\"k\""));
    }
}

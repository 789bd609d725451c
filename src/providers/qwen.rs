//! Alibaba DashScope (Qwen) chat completion backend. Text only.

use crate::gateway::{
    GatewayError, GenerationOutput, GenerationRequest, ModelBackend, ProviderConfig, tokens,
};
use crate::providers::http;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";

pub struct QwenBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl QwenBackend {
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

    fn endpoint(&self) -> String {
        format!("{}/compatible-mode/v1/chat/completions", self.base_url)
    }
}

impl std::fmt::Debug for QwenBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QwenBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

pub(crate) fn request_body(request: &GenerationRequest, model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{ "role": "user", "content": request.prompt_text() }],
        "temperature": request.sampling.temperature,
        "top_p": request.sampling.top_p,
        "max_tokens": request.sampling.max_output_tokens,
    })
}

pub(crate) fn parse_response(body: &Value) -> Result<GenerationOutput, GatewayError> {
    let text = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| GatewayError::transient("response contained no completion"))?;

    let mut output = GenerationOutput::new(text);
    if let Some(usage) = body.get("usage") {
        let count = |field: &str| usage.get(field).and_then(Value::as_u64).unwrap_or(0);
        output = output.with_usage(count("prompt_tokens"), count("completion_tokens"));
    }
    Ok(output)
}

#[async_trait]
impl ModelBackend for QwenBackend {
    fn provider(&self) -> &str {
        crate::defaults::QWEN_PROVIDER
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        model: &ProviderConfig,
    ) -> Result<GenerationOutput, GatewayError> {
        if request.has_audio() {
            return Err(GatewayError::invalid_request(
                "Qwen text models do not accept audio input",
            ));
        }
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| GatewayError::auth("API key contains invalid characters"))?;
        headers.insert(AUTHORIZATION, bearer);

        let body = request_body(request, &model.api_name);
        let response = http::post_json(&self.client, &self.endpoint(), headers, &body).await?;
        parse_response(&response)
    }

    fn count_tokens(&self, text: &str, _model: &ProviderConfig) -> u64 {
        tokens::estimate_qwen_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let request = GenerationRequest::text("qwen-max", "analyze this");
        let body = request_body(&request, "qwen-max");
        assert_eq!(body["model"], "qwen-max");
        assert_eq!(body["messages"][0]["content"], "analyze this");
        assert_eq!(body["max_tokens"], 16384);
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "A report" } }],
            "usage": { "prompt_tokens": 40, "completion_tokens": 8 }
        });
        let output = parse_response(&body).unwrap();
        assert_eq!(output.text, "A report");
        assert_eq!(output.usage.unwrap().input_tokens, 40);
    }

    #[test]
    fn test_parse_response_without_usage() {
        let body = json!({ "choices": [{ "message": { "content": "ok" } }] });
        assert!(parse_response(&body).unwrap().usage.is_none());
    }

    #[test]
    fn test_parse_response_empty() {
        let body = json!({ "choices": [] });
        assert!(parse_response(&body).unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_audio_rejected_before_network() {
        let backend = QwenBackend::new("k".to_string()).with_base_url("http://127.0.0.1:9");
        let model = ProviderConfig::new("qwen", "qwen-max", "Qwen Max", 1.0, 1.0);
        let request = GenerationRequest::text("qwen-max", "x").with_audio(vec![0]);
        let err = backend.generate(&request, &model).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }

    #[test]
    fn test_counts_with_qwen_heuristic() {
        let backend = QwenBackend::new("k".to_string());
        let model = ProviderConfig::new("qwen", "qwen-max", "Qwen Max", 1.0, 1.0);
        assert_eq!(backend.count_tokens("你好", &model), 3);
    }
}

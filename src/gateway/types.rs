//! Request and result types exchanged with the Gateway.

use crate::config::SamplingConfig;
use crate::defaults;
use serde::Serialize;
use std::time::Duration;

/// One piece of a multimodal prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// Encoded audio (WAV) sent inline.
    Audio { mime_type: String, data: Vec<u8> },
}

/// Sampling parameters forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: defaults::TEMPERATURE,
            top_p: defaults::TOP_P,
            max_output_tokens: defaults::MAX_OUTPUT_TOKENS,
        }
    }
}

impl From<&SamplingConfig> for SamplingParams {
    fn from(config: &SamplingConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// A single Gateway call: payload, model selection and sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Model api name, resolved through the catalog.
    pub model: String,
    pub parts: Vec<Part>,
    pub sampling: SamplingParams,
    /// Short identifier for logs (e.g. `job-3/analyze`). Never the prompt itself.
    pub label: String,
}

impl GenerationRequest {
    /// Creates a text-only request.
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: vec![Part::Text(prompt.into())],
            sampling: SamplingParams::default(),
            label: String::new(),
        }
    }

    /// Appends a WAV payload.
    pub fn with_audio(mut self, wav: Vec<u8>) -> Self {
        self.parts.push(Part::Audio {
            mime_type: "audio/wav".to_string(),
            data: wav,
        });
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn has_audio(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Audio { .. }))
    }

    /// All text parts joined with newlines.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Audio { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Token counts reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// What a backend returns for one successful attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    /// `None` when the API did not report usage; the Gateway estimates it.
    pub usage: Option<TokenUsage>,
}

impl GenerationOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Some(TokenUsage {
            input_tokens,
            output_tokens,
        });
        self
    }
}

/// Result of a Gateway call after retries, with accounting attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    /// Estimated cost in USD.
    pub cost: f64,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    pub elapsed: Duration,
}

//! Static (provider, model) price and capability table.

use crate::defaults;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One (provider, model) pair. Read-only after startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry key of the backend serving this model.
    pub provider: String,
    /// Model name sent to the API.
    pub api_name: String,
    pub display_name: String,
    /// USD per million input tokens.
    pub input_price_per_million: f64,
    /// USD per million output tokens.
    pub output_price_per_million: f64,
    /// Whether the model accepts audio input.
    #[serde(default)]
    pub supports_audio: bool,
}

impl ProviderConfig {
    pub fn new(
        provider: &str,
        api_name: &str,
        display_name: &str,
        input_price_per_million: f64,
        output_price_per_million: f64,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            api_name: api_name.to_string(),
            display_name: display_name.to_string(),
            input_price_per_million,
            output_price_per_million,
            supports_audio: false,
        }
    }

    pub fn with_audio(mut self) -> Self {
        self.supports_audio = true;
        self
    }

    /// Cost in USD of a call with the given token counts.
    pub fn estimate_cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        estimate_cost(tokens_in, tokens_out, self)
    }
}

/// Cost in USD of `tokens_in` / `tokens_out` at the model's unit prices.
pub fn estimate_cost(tokens_in: u64, tokens_out: u64, config: &ProviderConfig) -> f64 {
    (tokens_in as f64 / 1_000_000.0) * config.input_price_per_million
        + (tokens_out as f64 / 1_000_000.0) * config.output_price_per_million
}

/// All known models, keyed by api name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelCatalog {
    models: BTreeMap<String, ProviderConfig>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The models shipped with the engine.
    pub fn builtin() -> Self {
        let g = defaults::GEMINI_PROVIDER;
        let q = defaults::QWEN_PROVIDER;
        Self::from_configs([
            ProviderConfig::new(g, "gemini-2.5-pro", "Gemini 2.5 Pro", 1.25, 10.0).with_audio(),
            ProviderConfig::new(g, "gemini-2.5-flash", "Gemini 2.5 Flash", 0.30, 2.50).with_audio(),
            ProviderConfig::new(g, "gemini-2.0-flash", "Gemini 2.0 Flash", 0.10, 0.40).with_audio(),
            ProviderConfig::new(q, "qwen-max", "Qwen Max", 1.60, 6.40),
            ProviderConfig::new(q, "qwen-plus", "Qwen Plus", 0.40, 1.20),
            ProviderConfig::new(q, "qwen-turbo", "Qwen Turbo", 0.05, 0.20),
        ])
    }

    pub fn from_configs(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let models = configs
            .into_iter()
            .map(|c| (c.api_name.clone(), c))
            .collect();
        Self { models }
    }

    /// Parses the external price table.
    ///
    /// One record per line: `provider, model_api_name, display_name, input_price,
    /// output_price[, audio]`. Blank lines and `#` comments are skipped.
    pub fn parse_table(text: &str) -> Result<Self> {
        let mut catalog = Self::new();
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let key = format!("catalog line {}", line_no + 1);
            if fields.len() < 5 {
                return Err(EngineError::ConfigInvalidValue {
                    key,
                    message: format!("expected at least 5 fields, got {}", fields.len()),
                });
            }
            let price = |s: &str| {
                s.parse::<f64>()
                    .map_err(|e| EngineError::ConfigInvalidValue {
                        key: key.clone(),
                        message: format!("invalid price {s:?}: {e}"),
                    })
            };
            let mut config = ProviderConfig::new(
                &fields[0].to_lowercase(),
                fields[1],
                fields[2],
                price(fields[3])?,
                price(fields[4])?,
            );
            config.supports_audio = fields
                .get(5)
                .is_some_and(|flag| flag.eq_ignore_ascii_case("audio"));
            catalog.insert(config);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, config: ProviderConfig) {
        self.models.insert(config.api_name.clone(), config);
    }

    /// Adds or replaces every model of `other`.
    pub fn merge(&mut self, other: ModelCatalog) {
        self.models.extend(other.models);
    }

    pub fn get(&self, api_name: &str) -> Option<&ProviderConfig> {
        self.models.get(api_name)
    }

    pub fn for_provider<'a>(&'a self, provider: &'a str) -> impl Iterator<Item = &'a ProviderConfig> {
        self.models
            .values()
            .filter(move |c| c.provider.eq_ignore_ascii_case(provider))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

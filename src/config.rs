use crate::defaults;
use crate::error::{EngineError, Result};
use crate::gateway::{ModelCatalog, ProviderConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Root configuration, built once at startup and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub gateway: GatewayConfig,
    pub chunking: ChunkingConfig,
    pub models: ModelsConfig,
    pub sampling: SamplingConfig,
    pub templates: TemplatesConfig,
    pub batch: BatchConfig,
    /// Extra or overriding catalog records.
    pub catalog: Vec<ProviderConfig>,
    pub providers: ProvidersConfig,
}

/// Retry, timeout and concurrency settings of the Gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub rate_limit_backoff_multiplier: f64,
    pub max_concurrent_requests: usize,
}

/// Long-audio chunking and reassembly
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub single_call_threshold_secs: u64,
    pub target_chunk_secs: u64,
    pub overlap_secs: u64,
    /// Ask the model to label speakers.
    pub diarization: bool,
    /// Run the merged transcript through the optimization template.
    pub optimize_transcript: bool,
    pub min_time_overlap: f64,
    pub min_text_similarity: f64,
}

/// Default model api name per stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    pub transcription: String,
    pub analysis: String,
    pub proposal: String,
    pub optimization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

/// Default analysis and proposal template names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemplatesConfig {
    pub analysis: String,
    pub proposal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency_limit: usize,
    /// Stop admitting jobs once one fails on authentication.
    pub halt_on_auth_error: bool,
}

/// Per-provider endpoint overrides, keyed by provider id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct ProvidersConfig {
    pub entries: BTreeMap<String, ProviderEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ProviderEndpoint {
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            max_retries: defaults::MAX_RETRIES,
            base_backoff_ms: defaults::BASE_BACKOFF_MS,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
            rate_limit_backoff_multiplier: defaults::RATE_LIMIT_BACKOFF_MULTIPLIER,
            max_concurrent_requests: defaults::MAX_CONCURRENT_REQUESTS,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            single_call_threshold_secs: defaults::SINGLE_CALL_THRESHOLD_SECS,
            target_chunk_secs: defaults::TARGET_CHUNK_SECS,
            overlap_secs: defaults::OVERLAP_SECS,
            diarization: true,
            optimize_transcript: false,
            min_time_overlap: defaults::MIN_TIME_OVERLAP,
            min_text_similarity: defaults::MIN_TEXT_SIMILARITY,
        }
    }
}

impl ChunkingConfig {
    pub fn single_call_threshold(&self) -> Duration {
        Duration::from_secs(self.single_call_threshold_secs)
    }

    pub fn target_chunk(&self) -> Duration {
        Duration::from_secs(self.target_chunk_secs)
    }

    pub fn overlap(&self) -> Duration {
        Duration::from_secs(self.overlap_secs)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            transcription: defaults::TRANSCRIPTION_MODEL.to_string(),
            analysis: defaults::ANALYSIS_MODEL.to_string(),
            proposal: defaults::PROPOSAL_MODEL.to_string(),
            optimization: defaults::OPTIMIZATION_MODEL.to_string(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: defaults::TEMPERATURE,
            top_p: defaults::TOP_P,
            max_output_tokens: defaults::MAX_OUTPUT_TOKENS,
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            analysis: defaults::ANALYSIS_TEMPLATE.to_string(),
            proposal: defaults::PROPOSAL_TEMPLATE.to_string(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: defaults::CONCURRENCY_LIMIT,
            halt_on_auth_error: true,
        }
    }
}

impl ProvidersConfig {
    /// Environment variable for `provider`'s key: configured, well-known, or `<ID>_API_KEY`.
    pub fn api_key_env(&self, provider: &str) -> String {
        if let Some(var) = self
            .entries
            .get(provider)
            .and_then(|e| e.api_key_env.as_deref())
        {
            return var.to_string();
        }
        match provider {
            defaults::GEMINI_PROVIDER => defaults::GEMINI_API_KEY_ENV.to_string(),
            defaults::QWEN_PROVIDER => defaults::DASHSCOPE_API_KEY_ENV.to_string(),
            other => format!("{}_API_KEY", other.to_uppercase()),
        }
    }

    pub fn base_url(&self, provider: &str) -> Option<&str> {
        self.entries
            .get(provider)
            .and_then(|e| e.base_url.as_deref())
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values. The result is not validated.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                EngineError::Io(e)
            }
        })?;
        let config: EngineConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(EngineError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PROPOSAL_ENGINE_CONCURRENCY → batch.concurrency_limit
    /// - PROPOSAL_ENGINE_TRANSCRIPTION_MODEL → models.transcription
    /// - PROPOSAL_ENGINE_ANALYSIS_MODEL → models.analysis
    /// - PROPOSAL_ENGINE_PROPOSAL_MODEL → models.proposal
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(limit) = std::env::var("PROPOSAL_ENGINE_CONCURRENCY")
            && !limit.is_empty()
        {
            self.batch.concurrency_limit =
                limit
                    .trim()
                    .parse()
                    .map_err(|_| EngineError::ConfigInvalidValue {
                        key: "PROPOSAL_ENGINE_CONCURRENCY".to_string(),
                        message: format!("{limit:?} is not a positive integer"),
                    })?;
        }

        if let Ok(model) = std::env::var("PROPOSAL_ENGINE_TRANSCRIPTION_MODEL")
            && !model.is_empty()
        {
            self.models.transcription = model;
        }

        if let Ok(model) = std::env::var("PROPOSAL_ENGINE_ANALYSIS_MODEL")
            && !model.is_empty()
        {
            self.models.analysis = model;
        }

        if let Ok(model) = std::env::var("PROPOSAL_ENGINE_PROPOSAL_MODEL")
            && !model.is_empty()
        {
            self.models.proposal = model;
        }

        Ok(self)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> EngineError {
            EngineError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        let c = &self.chunking;
        if c.single_call_threshold_secs == 0 {
            return Err(invalid(
                "chunking.single_call_threshold_secs",
                "must be greater than zero",
            ));
        }
        if c.overlap_secs >= c.target_chunk_secs {
            return Err(invalid(
                "chunking.overlap_secs",
                "must be shorter than target_chunk_secs",
            ));
        }
        for (key, value) in [
            ("chunking.min_time_overlap", c.min_time_overlap),
            ("chunking.min_text_similarity", c.min_text_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, "must be between 0 and 1"));
            }
        }
        if self.batch.concurrency_limit == 0 {
            return Err(invalid("batch.concurrency_limit", "must be at least 1"));
        }
        if self.gateway.max_concurrent_requests == 0 {
            return Err(invalid(
                "gateway.max_concurrent_requests",
                "must be at least 1",
            ));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(invalid(
                "gateway.request_timeout_secs",
                "must be greater than zero",
            ));
        }
        if !(1.0..=100.0).contains(&self.gateway.rate_limit_backoff_multiplier) {
            return Err(invalid(
                "gateway.rate_limit_backoff_multiplier",
                "must be between 1 and 100",
            ));
        }
        if self.gateway.base_backoff_ms > self.gateway.max_backoff_ms {
            return Err(invalid(
                "gateway.base_backoff_ms",
                "must not exceed max_backoff_ms",
            ));
        }
        Ok(())
    }

    /// `$XDG_CONFIG_HOME/proposal-engine/config.toml`, or the working
    /// directory when no config directory is known.
    #[cfg(feature = "cli")]
    pub fn default_path() -> std::path::PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("proposal-engine")
            .join("config.toml")
    }

    /// Built-in catalog with the configured records merged over it.
    pub fn model_catalog(&self) -> ModelCatalog {
        let mut catalog = ModelCatalog::builtin();
        catalog.merge(ModelCatalog::from_configs(self.catalog.iter().cloned()));
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_engine_env() {
        remove_env("PROPOSAL_ENGINE_CONCURRENCY");
        remove_env("PROPOSAL_ENGINE_TRANSCRIPTION_MODEL");
        remove_env("PROPOSAL_ENGINE_ANALYSIS_MODEL");
        remove_env("PROPOSAL_ENGINE_PROPOSAL_MODEL");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = EngineConfig::default();

        assert_eq!(config.gateway.request_timeout_secs, 900);
        assert_eq!(config.gateway.max_retries, 3);
        assert_eq!(config.chunking.single_call_threshold_secs, 1200);
        assert_eq!(config.chunking.overlap_secs, 30);
        assert!(config.chunking.diarization);
        assert!(!config.chunking.optimize_transcript);
        assert_eq!(config.batch.concurrency_limit, 3);
        assert!(config.batch.halt_on_auth_error);
        assert_eq!(config.templates.analysis, "customer_interview");
        assert!(config.catalog.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [gateway]
            max_retries = 5
            request_timeout_secs = 60

            [chunking]
            target_chunk_secs = 600
            overlap_secs = 20

            [models]
            analysis = "qwen-max"

            [batch]
            concurrency_limit = 2

            [[catalog]]
            provider = "qwen"
            api_name = "qwen-long"
            display_name = "Qwen Long"
            input_price_per_million = 0.5
            output_price_per_million = 2.0

            [providers.qwen]
            base_url = "http://localhost:9000"
            api_key_env = "MY_QWEN_KEY"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = EngineConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.gateway.max_retries, 5);
        assert_eq!(config.gateway.base_backoff_ms, 1000);
        assert_eq!(config.chunking.target_chunk(), Duration::from_secs(600));
        assert_eq!(config.models.analysis, "qwen-max");
        assert_eq!(config.models.proposal, "gemini-2.5-pro");
        assert_eq!(config.batch.concurrency_limit, 2);
        assert_eq!(config.providers.base_url("qwen"), Some("http://localhost:9000"));
        assert_eq!(config.providers.api_key_env("qwen"), "MY_QWEN_KEY");
        assert!(config.model_catalog().get("qwen-long").is_some());
        assert!(config.model_catalog().get("gemini-2.5-pro").is_some());
    }

    #[test]
    fn test_api_key_env_defaults() {
        let providers = ProvidersConfig::default();
        assert_eq!(providers.api_key_env("gemini"), "GEMINI_API_KEY");
        assert_eq!(providers.api_key_env("qwen"), "DASHSCOPE_API_KEY");
        assert_eq!(providers.api_key_env("mistral"), "MISTRAL_API_KEY");
    }

    #[test]
    fn test_env_override_models_and_concurrency() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_engine_env();

        set_env("PROPOSAL_ENGINE_CONCURRENCY", "7");
        set_env("PROPOSAL_ENGINE_ANALYSIS_MODEL", "qwen-plus");
        let config = EngineConfig::default().with_env_overrides().unwrap();
        assert_eq!(config.batch.concurrency_limit, 7);
        assert_eq!(config.models.analysis, "qwen-plus");
        assert_eq!(config.models.transcription, "gemini-2.5-pro");

        clear_engine_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_engine_env();

        set_env("PROPOSAL_ENGINE_PROPOSAL_MODEL", "");
        let config = EngineConfig::default().with_env_overrides().unwrap();
        assert_eq!(config.models.proposal, "gemini-2.5-pro");

        clear_engine_env();
    }

    #[test]
    fn test_env_override_bad_concurrency() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_engine_env();

        set_env("PROPOSAL_ENGINE_CONCURRENCY", "many");
        let result = EngineConfig::default().with_env_overrides();
        assert!(matches!(result, Err(EngineError::ConfigInvalidValue { .. })));

        clear_engine_env();
    }

    #[test]
    fn test_validate_rejects_overlap_not_shorter_than_target() {
        let mut config = EngineConfig::default();
        config.chunking.overlap_secs = config.chunking.target_chunk_secs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunking.overlap_secs"));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = EngineConfig::default();
        config.batch.concurrency_limit = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.gateway.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_thresholds() {
        let mut config = EngineConfig::default();
        config.chunking.min_text_similarity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[gateway\nmax_retries = ").unwrap();

        let result = EngineConfig::load(temp_file.path());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing = Path::new("/tmp/nonexistent_proposal_engine_config_12345.toml");
        let config = EngineConfig::load_or_default(missing).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_or_default_keeps_parse_errors() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[chunking\n").unwrap();
        assert!(EngineConfig::load_or_default(temp_file.path()).is_err());
    }
}

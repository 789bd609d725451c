//! Error types for the proposal engine.

use crate::gateway::GatewayError;
use crate::template::TemplateError;
use crate::transcript::ChunkFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Input errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Audio decoding failed: {message}")]
    AudioDecode { message: String },

    /// Every audio window failed; one record per window.
    #[error("All {} audio segments failed to transcribe, first error: {source}", .failures.len())]
    ChunksFailed {
        failures: Vec<ChunkFailure>,
        source: GatewayError,
    },

    // Component errors
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Classification used when this error ends a job.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Gateway(e) => e.kind(),
            // Auth keeps its kind so the batch still halts on it.
            EngineError::ChunksFailed { source, .. } => match source.kind() {
                ErrorKind::Auth => ErrorKind::Auth,
                _ => ErrorKind::ChunkFailure,
            },
            EngineError::Template(_) => ErrorKind::Template,
            EngineError::InvalidInput { .. } | EngineError::AudioDecode { .. } => {
                ErrorKind::InvalidInput
            }
            _ => ErrorKind::Internal,
        }
    }
}

/// Terminal error classification recorded on jobs and chunk failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Network failure, 5xx or timeout. Retried.
    Transient,
    /// 429 or quota exhaustion. Retried with longer backoff.
    RateLimit,
    /// Malformed prompt, unknown model or unsupported modality. Never retried.
    InvalidRequest,
    /// Bad credential. Never retried; halts batch admission.
    Auth,
    /// Missing template or template variable.
    Template,
    /// Input could not be used (empty document, undecodable audio).
    InvalidInput,
    /// One audio span, or every span of a recording, could not be transcribed.
    ChunkFailure,
    /// Bug or panic inside the engine.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Auth => "auth",
            ErrorKind::Template => "template",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ChunkFailure => "chunk_failure",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the Gateway retries a failure of this kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::RateLimit)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

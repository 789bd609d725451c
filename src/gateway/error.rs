//! Failures a backend call can end with.

use crate::error::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Typed failure of one Gateway call.
///
/// Backends map their transport and API errors onto these variants; the
/// Gateway's retry policy only looks at [`GatewayError::kind`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("transient backend failure: {message}")]
    Transient { message: String },

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Server-provided wait, when the backend sent one.
        retry_after: Option<Duration>,
    },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("no backend registered for provider {provider}")]
    UnknownProvider { provider: String },

    #[error("model {model} is not in the catalog")]
    UnknownModel { model: String },
}

impl GatewayError {
    pub fn transient(message: impl Into<String>) -> Self {
        GatewayError::Transient {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        GatewayError::RateLimited {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        GatewayError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        GatewayError::Auth {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Transient { .. } => ErrorKind::Transient,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimit,
            GatewayError::InvalidRequest { .. }
            | GatewayError::UnknownProvider { .. }
            | GatewayError::UnknownModel { .. } => ErrorKind::InvalidRequest,
            GatewayError::Auth { .. } => ErrorKind::Auth,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Wait requested by the server, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

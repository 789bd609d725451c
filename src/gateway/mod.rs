//! Provider Gateway: one interface over every model backend.
//!
//! A [`Gateway`] owns the model catalog, the provider registry, the retry
//! policy and the usage ledger. Callers only build [`GenerationRequest`]s.

pub mod backend;
pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod retry;
pub mod tokens;
pub mod types;
pub mod usage;

pub use backend::{MockBackend, MockReply, ModelBackend, RecordedCall};
pub use catalog::{ModelCatalog, ProviderConfig, estimate_cost};
pub use dispatch::Gateway;
pub use error::GatewayError;
pub use registry::ProviderRegistry;
pub use retry::RetryPolicy;
pub use types::{
    GenerationOutput, GenerationRequest, GenerationResult, Part, SamplingParams, TokenUsage,
};
pub use usage::{UsageKey, UsageLedger, UsageTotals};

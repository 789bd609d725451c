//! Default configuration constants for the proposal engine.
//!
//! Shared by the config sections and the components that fall back to them,
//! so a default only ever lives in one place.

/// Sample rate audio clips are normalised to before chunking, in Hz.
///
/// 16kHz mono is what every speech backend accepts without resampling on its side
/// and keeps inline WAV payloads small.
pub const SAMPLE_RATE: u32 = 16000;

/// Per-attempt timeout for a single Gateway call, in seconds.
///
/// Long transcriptions and proposal drafts routinely take several minutes.
pub const REQUEST_TIMEOUT_SECS: u64 = 900;

/// Retries after the first attempt for retryable failures.
pub const MAX_RETRIES: u32 = 3;

/// Base delay of the exponential backoff, in milliseconds.
pub const BASE_BACKOFF_MS: u64 = 1000;

/// Cap on a single backoff delay, in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Factor applied to backoff delays after a rate-limit response.
pub const RATE_LIMIT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Calls the Gateway keeps in flight at once, across all jobs.
pub const MAX_CONCURRENT_REQUESTS: usize = 8;

/// Audio at or below this duration is transcribed in one call, in seconds.
pub const SINGLE_CALL_THRESHOLD_SECS: u64 = 20 * 60;

/// Target window length for chunked transcription, in seconds.
pub const TARGET_CHUNK_SECS: u64 = 20 * 60;

/// Overlap between consecutive windows, in seconds.
///
/// Long enough to hold a few utterances on both sides of a cut so speaker
/// tags can be reconciled.
pub const OVERLAP_SECS: u64 = 30;

/// Minimum share of the shorter utterance two overlap utterances must share in time.
pub const MIN_TIME_OVERLAP: f64 = 0.5;

/// Minimum text similarity for two overlap utterances to count as the same speech.
pub const MIN_TEXT_SIMILARITY: f64 = 0.6;

/// Jobs running at once in a batch.
pub const CONCURRENCY_LIMIT: usize = 3;

/// Default sampling temperature.
pub const TEMPERATURE: f32 = 0.7;

/// Default nucleus sampling value.
pub const TOP_P: f32 = 0.95;

/// Default output token ceiling.
pub const MAX_OUTPUT_TOKENS: u32 = 16384;

/// Default model per stage.
pub const TRANSCRIPTION_MODEL: &str = "gemini-2.5-pro";
pub const ANALYSIS_MODEL: &str = "gemini-2.5-pro";
pub const PROPOSAL_MODEL: &str = "gemini-2.5-pro";
pub const OPTIMIZATION_MODEL: &str = "gemini-2.5-flash";

/// Default analysis template name (category `analysis`).
pub const ANALYSIS_TEMPLATE: &str = "customer_interview";

/// Default proposal template name (category `proposal`).
pub const PROPOSAL_TEMPLATE: &str = "project_proposal";

/// Provider identifiers known to the built-in registry.
pub const GEMINI_PROVIDER: &str = "gemini";
pub const QWEN_PROVIDER: &str = "qwen";

/// Environment variables the credential source reads.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DASHSCOPE_API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

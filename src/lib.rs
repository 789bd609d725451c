//! proposal-engine - recordings and documents in, business proposals out
//!
//! Each job runs Transcribe, Analyze and Propose through a provider-neutral
//! model Gateway; a batch scheduler runs many jobs under a concurrency cap.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod gateway;
#[cfg(feature = "cli")]
pub mod logging;
pub mod pipeline;
#[cfg(feature = "http-backends")]
pub mod providers;
pub mod template;
pub mod transcript;

// Core seams (backend → gateway → orchestrator → sink)
pub use gateway::{Gateway, GatewayError, MockBackend, ModelBackend, ProviderConfig, ProviderRegistry};
pub use pipeline::{CollectorSink, ResultSink, StdoutSink};

// Jobs and batches
pub use batch::{BatchEvent, BatchReport, BatchRun, BatchScheduler};
pub use pipeline::{Job, JobId, JobInput, JobReport, JobState, Orchestrator, Stage};

// Error handling
pub use error::{EngineError, ErrorKind, Result};

// Config
pub use config::EngineConfig;

// Templates and transcripts
pub use template::{InMemoryTemplateStore, TemplateCategory, TemplateStore};
pub use transcript::{Transcript, TranscriptionEngine};

pub use audio::AudioClip;

//! Stage 1 driver: plan windows, transcribe them in parallel, reassemble.

use crate::audio::AudioClip;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gateway::{
    Gateway, GatewayError, GenerationRequest, GenerationResult, SamplingParams, UsageTotals,
};
use crate::template::{TemplateCategory, TemplateStore, Variables};
use crate::transcript::parse::parse_transcript;
use crate::transcript::planner::{ChunkPlan, ChunkWindow};
use crate::transcript::reassembler::{ChunkOutcome, reassemble};
use crate::transcript::speakers::MatchThresholds;
use crate::transcript::types::{Chunk, ChunkFailure, Transcript, format_timestamp};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// What stage 1 hands to the analysis stage.
#[derive(Debug, Clone)]
pub struct TranscriptionOutput {
    pub transcript: Transcript,
    /// Rendered transcript, optimized when that pass ran and succeeded.
    pub text: String,
    pub optimized: bool,
    pub usage: UsageTotals,
}

/// Transcribes audio of any length through the Gateway.
#[derive(Clone)]
pub struct TranscriptionEngine {
    gateway: Arc<Gateway>,
    templates: Arc<dyn TemplateStore>,
    config: Arc<EngineConfig>,
}

impl TranscriptionEngine {
    pub fn new(
        gateway: Arc<Gateway>,
        templates: Arc<dyn TemplateStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            gateway,
            templates,
            config,
        }
    }

    pub fn plan(&self, audio: &AudioClip) -> ChunkPlan {
        ChunkPlan::for_duration(audio.duration(), &self.config.chunking)
    }

    /// Transcribes `audio` with `model`; `label` tags log lines and requests.
    ///
    /// Failed windows become gaps. The call only fails when every window
    /// failed, with [`EngineError::ChunksFailed`] listing each window.
    ///
    /// A window's audio is encoded only when its call is about to start, and
    /// no more windows are in flight than the Gateway admits at once.
    pub async fn transcribe(
        &self,
        label: &str,
        audio: &AudioClip,
        model: &str,
    ) -> Result<TranscriptionOutput> {
        if audio.duration().is_zero() {
            return Err(EngineError::InvalidInput {
                message: "audio clip is empty".to_string(),
            });
        }

        let started = Instant::now();
        let plan = self.plan(audio);
        tracing::debug!(
            label,
            duration_ms = plan.duration.as_millis() as u64,
            windows = plan.len(),
            "Chunk plan ready"
        );

        let prompts = plan
            .windows
            .iter()
            .map(|window| self.window_prompt(&plan, window))
            .collect::<Result<Vec<_>>>()?;

        let calls = plan.windows.iter().zip(prompts).map(|(window, prompt)| {
            let span = tracing::info_span!("chunk", index = window.index, range = %window.range);
            async move {
                let result = match audio.encode_wav(window.range.start, window.range.end) {
                    Ok(wav) => {
                        let request = GenerationRequest::text(model, prompt)
                            .with_audio(wav)
                            .with_sampling(SamplingParams::from(&self.config.sampling))
                            .with_label(format!("{label}/chunk-{}", window.index));
                        self.gateway.generate(&request).await
                    }
                    Err(e) => Err(GatewayError::invalid_request(format!(
                        "cannot encode audio window: {e}"
                    ))),
                };
                (window, result)
            }
            .instrument(span)
        }).collect::<Vec<_>>();
        let in_flight = self.config.gateway.max_concurrent_requests.max(1);
        let results: Vec<_> = stream::iter(calls).buffered(in_flight).collect().await;

        let mut usage = UsageTotals::default();
        let mut first_error: Option<GatewayError> = None;
        let mut outcomes = Vec::with_capacity(results.len());
        for (window, result) in results {
            match result {
                Ok(generated) => {
                    usage.add_result(&generated);
                    outcomes.push(ChunkOutcome::Transcribed(Chunk {
                        index: window.index,
                        range: window.range,
                        overlap_with_previous: window.overlap_with_previous,
                        utterances: parse_transcript(&generated.text, window.range),
                        raw_text: generated.text,
                    }));
                }
                Err(error) => {
                    usage.add_failure();
                    tracing::warn!(
                        label,
                        chunk = window.index,
                        range = %window.range,
                        kind = %error.kind(),
                        "Chunk transcription failed: {}",
                        error
                    );
                    outcomes.push(ChunkOutcome::Failed(ChunkFailure {
                        index: window.index,
                        range: window.range,
                        kind: error.kind(),
                        message: error.to_string(),
                    }));
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        if let Some(source) = first_error
            && outcomes.iter().all(|o| matches!(o, ChunkOutcome::Failed(_)))
        {
            let failures = outcomes
                .into_iter()
                .filter_map(|o| match o {
                    ChunkOutcome::Failed(failure) => Some(failure),
                    ChunkOutcome::Transcribed(_) => None,
                })
                .collect();
            return Err(EngineError::ChunksFailed { failures, source });
        }

        let transcript = reassemble(
            &plan,
            outcomes,
            MatchThresholds::from(&self.config.chunking),
        );
        tracing::info!(
            label,
            windows = plan.len(),
            failed = transcript.failures.len(),
            speakers = transcript.speakers().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcript reassembled"
        );

        let mut text = transcript.render_text();
        let mut optimized = false;
        if self.config.chunking.optimize_transcript {
            match self.optimize(label, &text).await {
                Ok(result) => {
                    usage.add_result(&result);
                    text = result.text;
                    optimized = true;
                }
                Err(EngineError::Gateway(error)) => {
                    usage.add_failure();
                    tracing::warn!(label, "Transcript optimization failed, keeping original: {}", error);
                }
                Err(error) => {
                    tracing::warn!(label, "Transcript optimization skipped: {}", error);
                }
            }
        }

        Ok(TranscriptionOutput {
            transcript,
            text,
            optimized,
            usage,
        })
    }

    fn window_prompt(&self, plan: &ChunkPlan, window: &ChunkWindow) -> Result<String> {
        let name = if self.config.chunking.diarization {
            "multi_speaker"
        } else {
            "single_speaker"
        };
        let template = self.templates.get(TemplateCategory::Transcription, name)?;

        let mut vars = Variables::new();
        vars.insert("segment_index".to_string(), (window.index + 1).to_string());
        vars.insert("segment_count".to_string(), plan.len().to_string());
        vars.insert("segment_start".to_string(), format_timestamp(window.range.start));
        vars.insert("segment_end".to_string(), format_timestamp(window.range.end));
        Ok(template.render(&vars)?)
    }

    async fn optimize(
        &self,
        label: &str,
        transcript: &str,
    ) -> Result<GenerationResult> {
        let template = self
            .templates
            .get(TemplateCategory::Transcription, "optimization")?;
        let mut vars = Variables::new();
        vars.insert("transcript".to_string(), transcript.to_string());
        let request = GenerationRequest::text(&self.config.models.optimization, template.render(&vars)?)
            .with_sampling(SamplingParams::from(&self.config.sampling))
            .with_label(format!("{label}/optimize"));
        Ok(self.gateway.generate(&request).await?)
    }
}

impl std::fmt::Debug for TranscriptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionEngine")
            .field("gateway", &self.gateway)
            .field("chunking", &self.config.chunking)
            .finish()
    }
}

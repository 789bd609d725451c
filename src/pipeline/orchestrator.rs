//! Per-job state machine: Transcribe, Analyze, Propose.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gateway::{Gateway, GenerationRequest, SamplingParams};
use crate::pipeline::cancel::CancelSignal;
use crate::pipeline::job::{Job, JobError, JobInput, JobReport, JobState, JobStatus, Stage, StageModels};
use crate::pipeline::sink::ResultSink;
use crate::template::{TemplateCategory, TemplateStore, Variables};
use crate::transcript::TranscriptionEngine;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;

const NO_CAPABILITY_DOCS: &str = "No capability documents were provided.";
const NO_CLIENT_PROFILE: &str = "No client profile was provided.";

/// How a job stopped short of success.
enum Halt {
    Cancelled,
    Failed(JobError),
}

/// Drives one job at a time through the three stages.
///
/// Cheap to clone; the scheduler hands one clone to every job task.
#[derive(Clone)]
pub struct Orchestrator {
    gateway: Arc<Gateway>,
    templates: Arc<dyn TemplateStore>,
    config: Arc<EngineConfig>,
    transcriber: TranscriptionEngine,
    sink: Option<Arc<dyn ResultSink>>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<Gateway>,
        templates: Arc<dyn TemplateStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let transcriber =
            TranscriptionEngine::new(Arc::clone(&gateway), Arc::clone(&templates), Arc::clone(&config));
        Self {
            gateway,
            templates,
            config,
            transcriber,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `job` to a terminal state.
    pub async fn run(&self, job: Job) -> JobReport {
        let (status, _) = watch::channel(job.status());
        self.run_with(job, &CancelSignal::new(), &status).await
    }

    /// Runs `job`, publishing every state change on `status` and stopping
    /// at the next stage boundary once `cancel` fires.
    pub async fn run_with(
        &self,
        mut job: Job,
        cancel: &CancelSignal,
        status: &watch::Sender<JobStatus>,
    ) -> JobReport {
        let span = tracing::info_span!("job", job_id = %job.id);
        async {
            let started = Instant::now();
            let outcome = self.drive(&mut job, cancel, status).await;
            let terminal = match outcome {
                Ok(()) => JobState::Succeeded,
                Err(Halt::Cancelled) => {
                    tracing::info!(last_stage = ?job.last_stage(), "Job cancelled");
                    JobState::Cancelled
                }
                Err(Halt::Failed(error)) => {
                    tracing::warn!(stage = %error.stage, kind = %error.kind, "Job failed: {}", error.message);
                    job.error = Some(error);
                    JobState::Failed
                }
            };
            if let Err(e) = self.enter(&mut job, terminal, status) {
                tracing::error!("{}", e);
            }

            if job.state() == JobState::Succeeded {
                tracing::info!(
                    cost = job.usage.cost,
                    tokens = job.usage.total_tokens(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job succeeded"
                );
                self.deliver(&job).await;
            }
            job.into_report(started.elapsed())
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        job: &mut Job,
        cancel: &CancelSignal,
        status: &watch::Sender<JobStatus>,
    ) -> std::result::Result<(), Halt> {
        let models = job
            .models
            .clone()
            .unwrap_or_else(|| StageModels::from(&self.config.models));

        self.begin(job, JobState::Transcribing, cancel, status)?;
        let source = self
            .transcribe(job, &models.transcription)
            .await
            .map_err(|e| Halt::Failed(JobError::new(Stage::Transcribing, &e)))?;

        self.begin(job, JobState::Analyzing, cancel, status)?;
        let analysis = self
            .analyze(job, &source, &models.analysis)
            .await
            .map_err(|e| Halt::Failed(JobError::new(Stage::Analyzing, &e)))?;

        self.begin(job, JobState::Proposing, cancel, status)?;
        let proposal = self
            .propose(job, &analysis, &models.proposal)
            .await
            .map_err(|e| Halt::Failed(JobError::new(Stage::Proposing, &e)))?;
        job.outputs.proposal = Some(proposal);
        Ok(())
    }

    /// Stage boundary: honour cancellation, then enter `state`.
    fn begin(
        &self,
        job: &mut Job,
        state: JobState,
        cancel: &CancelSignal,
        status: &watch::Sender<JobStatus>,
    ) -> std::result::Result<(), Halt> {
        if cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        let stage = state.stage().unwrap_or(Stage::Transcribing);
        self.enter(job, state, status)
            .map_err(|e| Halt::Failed(JobError::new(stage, &e)))?;
        tracing::info!(stage = %stage, "Stage started");
        Ok(())
    }

    fn enter(
        &self,
        job: &mut Job,
        state: JobState,
        status: &watch::Sender<JobStatus>,
    ) -> Result<()> {
        job.transition(state)?;
        status.send_replace(job.status());
        Ok(())
    }

    /// Stage 1. Returns the text analysis works from.
    async fn transcribe(&self, job: &mut Job, model: &str) -> Result<String> {
        let text = match &job.input {
            JobInput::Document(text) => {
                if text.trim().is_empty() {
                    return Err(EngineError::InvalidInput {
                        message: "document is empty".to_string(),
                    });
                }
                tracing::debug!(chars = text.chars().count(), "Document passed through");
                text.clone()
            }
            JobInput::Audio(clip) => {
                let output = self
                    .transcriber
                    .transcribe(job.id.as_str(), clip, model)
                    .await
                    .inspect_err(|e| {
                        if let EngineError::ChunksFailed { failures, .. } = e {
                            job.outputs.chunk_failures = failures.clone();
                        }
                    })?;
                job.usage.absorb(&output.usage);
                job.outputs.chunk_failures = output.transcript.failures.clone();
                if output.transcript.is_partial() {
                    job.outputs.caveat = Some(format!(
                        "Note: {} of {} segments of the recording could not be transcribed. \
                         Treat the marked gaps as missing information and do not guess their content.",
                        output.transcript.failures.len(),
                        output.transcript.chunk_count()
                    ));
                }
                job.outputs.transcript = Some(output.transcript);
                output.text
            }
        };
        job.outputs.source_text = Some(text.clone());
        Ok(text)
    }

    async fn analyze(&self, job: &mut Job, source: &str, model: &str) -> Result<String> {
        let name = job
            .analysis_template
            .as_deref()
            .unwrap_or(&self.config.templates.analysis);
        let template = self.templates.get(TemplateCategory::Analysis, name)?;

        let mut vars = Variables::new();
        vars.insert("transcript".to_string(), source.to_string());
        vars.insert(
            "coverage_note".to_string(),
            job.outputs.caveat.clone().unwrap_or_default(),
        );
        let prompt = template.render(&vars)?;

        let analysis = self.generate(job, model, prompt, "analysis").await?;
        job.outputs.analysis = Some(analysis.clone());
        Ok(analysis)
    }

    async fn propose(&self, job: &mut Job, analysis: &str, model: &str) -> Result<String> {
        let name = job
            .proposal_template
            .as_deref()
            .unwrap_or(&self.config.templates.proposal);
        let template = self.templates.get(TemplateCategory::Proposal, name)?;

        let mut vars = Variables::new();
        vars.insert("analysis_report".to_string(), analysis.to_string());
        vars.insert(
            "capability_docs".to_string(),
            job.capability_docs
                .clone()
                .unwrap_or_else(|| NO_CAPABILITY_DOCS.to_string()),
        );
        vars.insert(
            "client_profile".to_string(),
            job.client_profile
                .clone()
                .unwrap_or_else(|| NO_CLIENT_PROFILE.to_string()),
        );
        let prompt = template.render(&vars)?;

        self.generate(job, model, prompt, "proposal").await
    }

    async fn generate(&self, job: &mut Job, model: &str, prompt: String, step: &str) -> Result<String> {
        let request = GenerationRequest::text(model, prompt)
            .with_sampling(SamplingParams::from(&self.config.sampling))
            .with_label(format!("{}/{step}", job.id));
        match self.gateway.generate(&request).await {
            Ok(result) => {
                job.usage.add_result(&result);
                Ok(result.text)
            }
            Err(error) => {
                job.usage.add_failure();
                Err(error.into())
            }
        }
    }

    async fn deliver(&self, job: &Job) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.deliver(&job.id, &job.outputs).await {
            tracing::warn!(sink = sink.name(), "Result sink failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("gateway", &self.gateway)
            .field("sink", &self.sink.as_ref().map(|s| s.name()))
            .finish()
    }
}

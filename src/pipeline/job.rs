//! Job model: input, per-stage settings, state machine, outputs.

use crate::audio::AudioClip;
use crate::config::ModelsConfig;
use crate::error::{EngineError, ErrorKind, Result};
use crate::gateway::UsageTotals;
use crate::transcript::{ChunkFailure, Transcript};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// What a job starts from.
#[derive(Debug, Clone)]
pub enum JobInput {
    Audio(AudioClip),
    /// Text already extracted from a document.
    Document(String),
}

impl JobInput {
    pub fn kind(&self) -> &'static str {
        match self {
            JobInput::Audio(_) => "audio",
            JobInput::Document(_) => "document",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transcribing,
    Analyzing,
    Proposing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transcribing => "transcribing",
            Stage::Analyzing => "analyzing",
            Stage::Proposing => "proposing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Transcribing,
    Analyzing,
    Proposing,
    Succeeded,
    Failed,
    /// Abandoned at a stage boundary or never admitted.
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// The stage this state runs, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            JobState::Transcribing => Some(Stage::Transcribing),
            JobState::Analyzing => Some(Stage::Analyzing),
            JobState::Proposing => Some(Stage::Proposing),
            _ => None,
        }
    }

    /// Forward-only transitions; `Failed` and `Cancelled` from any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Queued, Transcribing)
            | (Transcribing, Analyzing)
            | (Analyzing, Proposing)
            | (Proposing, Succeeded) => true,
            (from, Failed | Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Transcribing => "transcribing",
            JobState::Analyzing => "analyzing",
            JobState::Proposing => "proposing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model api name per stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageModels {
    pub transcription: String,
    pub analysis: String,
    pub proposal: String,
}

impl From<&ModelsConfig> for StageModels {
    fn from(config: &ModelsConfig) -> Self {
        Self {
            transcription: config.transcription.clone(),
            analysis: config.analysis.clone(),
            proposal: config.proposal.clone(),
        }
    }
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(stage: Stage, error: &EngineError) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({}): {}", self.stage, self.kind, self.message)
    }
}

/// Everything a job produced so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobOutputs {
    /// `None` for document jobs.
    pub transcript: Option<Transcript>,
    /// Stage 1 text handed to analysis.
    pub source_text: Option<String>,
    /// Set when the transcript has gaps.
    pub caveat: Option<String>,
    pub analysis: Option<String>,
    pub proposal: Option<String>,
    /// Audio windows that could not be transcribed, including when none could.
    pub chunk_failures: Vec<ChunkFailure>,
}

/// One unit of end-to-end work.
///
/// Unset templates and models fall back to the engine configuration.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input: JobInput,
    pub models: Option<StageModels>,
    pub analysis_template: Option<String>,
    pub proposal_template: Option<String>,
    pub capability_docs: Option<String>,
    pub client_profile: Option<String>,
    state: JobState,
    last_stage: Option<Stage>,
    pub outputs: JobOutputs,
    pub error: Option<JobError>,
    pub usage: UsageTotals,
}

impl Job {
    pub fn new(id: impl Into<JobId>, input: JobInput) -> Self {
        Self {
            id: id.into(),
            input,
            models: None,
            analysis_template: None,
            proposal_template: None,
            capability_docs: None,
            client_profile: None,
            state: JobState::Queued,
            last_stage: None,
            outputs: JobOutputs::default(),
            error: None,
            usage: UsageTotals::default(),
        }
    }

    pub fn audio(id: &str, clip: AudioClip) -> Self {
        Self::new(id, JobInput::Audio(clip))
    }

    pub fn document(id: &str, text: impl Into<String>) -> Self {
        Self::new(id, JobInput::Document(text.into()))
    }

    pub fn with_models(mut self, models: StageModels) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_analysis_template(mut self, name: &str) -> Self {
        self.analysis_template = Some(name.to_string());
        self
    }

    pub fn with_proposal_template(mut self, name: &str) -> Self {
        self.proposal_template = Some(name.to_string());
        self
    }

    pub fn with_capability_docs(mut self, docs: impl Into<String>) -> Self {
        self.capability_docs = Some(docs.into());
        self
    }

    pub fn with_client_profile(mut self, profile: impl Into<String>) -> Self {
        self.client_profile = Some(profile.into());
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Last stage entered, kept after the job ends.
    pub fn last_stage(&self) -> Option<Stage> {
        self.last_stage
    }

    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::Other(format!(
                "job {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        if let Some(stage) = next.stage() {
            self.last_stage = Some(stage);
        }
        Ok(())
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id.clone(),
            state: self.state,
            last_stage: self.last_stage,
        }
    }

    pub fn into_report(self, elapsed: Duration) -> JobReport {
        JobReport {
            id: self.id,
            state: self.state,
            last_stage: self.last_stage,
            error: self.error,
            outputs: self.outputs,
            usage: self.usage,
            elapsed,
        }
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lightweight view published on every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub last_stage: Option<Stage>,
}

/// Final outcome of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub id: JobId,
    pub state: JobState,
    pub last_stage: Option<Stage>,
    pub error: Option<JobError>,
    pub outputs: JobOutputs,
    pub usage: UsageTotals,
    pub elapsed: Duration,
}

impl JobReport {
    /// Report for a job that was never started.
    pub fn not_started(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Cancelled,
            last_stage: None,
            error: None,
            outputs: JobOutputs::default(),
            usage: UsageTotals::default(),
            elapsed: Duration::ZERO,
        }
    }

    /// Report for a job whose task died without producing one.
    pub fn internal_failure(status: &JobStatus, message: String) -> Self {
        let stage = status.last_stage.unwrap_or(Stage::Transcribing);
        Self {
            id: status.id.clone(),
            state: JobState::Failed,
            last_stage: status.last_stage,
            error: Some(JobError {
                stage,
                kind: ErrorKind::Internal,
                message,
            }),
            outputs: JobOutputs::default(),
            usage: UsageTotals::default(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut job = Job::document("j1", "notes");
        assert_eq!(job.state(), JobState::Queued);
        for next in [
            JobState::Transcribing,
            JobState::Analyzing,
            JobState::Proposing,
            JobState::Succeeded,
        ] {
            job.transition(next).unwrap();
        }
        assert_eq!(job.last_stage(), Some(Stage::Proposing));
        assert!(job.state().is_terminal());
    }

    #[test]
    fn test_no_backward_or_skipping_transitions() {
        assert!(!JobState::Analyzing.can_transition_to(JobState::Transcribing));
        assert!(!JobState::Queued.can_transition_to(JobState::Analyzing));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Failed));
        assert!(!JobState::Failed.can_transition_to(JobState::Cancelled));
    }

    #[test]
    fn test_failed_and_cancelled_reachable_from_any_active_state() {
        for from in [
            JobState::Queued,
            JobState::Transcribing,
            JobState::Analyzing,
            JobState::Proposing,
        ] {
            assert!(from.can_transition_to(JobState::Failed), "{from}");
            assert!(from.can_transition_to(JobState::Cancelled), "{from}");
        }
    }

    #[test]
    fn test_failure_keeps_last_stage() {
        let mut job = Job::document("j1", "notes");
        job.transition(JobState::Transcribing).unwrap();
        job.transition(JobState::Analyzing).unwrap();
        job.transition(JobState::Failed).unwrap();
        assert_eq!(job.last_stage(), Some(Stage::Analyzing));
        assert!(job.transition(JobState::Proposing).is_err());
    }

    #[test]
    fn test_job_error_display() {
        let err = JobError::new(
            Stage::Analyzing,
            &EngineError::InvalidInput {
                message: "empty".to_string(),
            },
        );
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(
            err.to_string(),
            "analyzing failed (invalid_input): Invalid input: empty"
        );
    }

    #[test]
    fn test_not_started_report() {
        let report = JobReport::not_started(JobId::new("j9"));
        assert_eq!(report.state, JobState::Cancelled);
        assert_eq!(report.last_stage, None);
    }
}

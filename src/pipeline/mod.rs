//! Job pipeline: one job runs Transcribe, Analyze, Propose in order.
//!
//! The [`Orchestrator`] owns the job while it runs and reports state changes
//! through a `watch` channel; a [`CancelSignal`] stops it at the next stage
//! boundary.

pub mod cancel;
pub mod job;
pub mod orchestrator;
pub mod sink;

pub use cancel::CancelSignal;
pub use job::{
    Job, JobError, JobId, JobInput, JobOutputs, JobReport, JobState, JobStatus, Stage,
    StageModels,
};
pub use orchestrator::Orchestrator;
pub use sink::{CollectorSink, ResultSink, StdoutSink};

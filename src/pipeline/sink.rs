//! Destinations for the outputs of succeeded jobs.

use crate::error::Result;
use crate::pipeline::job::{JobId, JobOutputs};
use async_trait::async_trait;
use std::sync::Mutex;

/// Pluggable output handler for finished jobs.
///
/// Called once per succeeded job. A failing sink is logged by the
/// orchestrator and never changes the job's outcome.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, job: &JobId, outputs: &JobOutputs) -> Result<()>;

    /// Name for logging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Keeps every delivery in memory.
#[derive(Debug, Default)]
pub struct CollectorSink {
    collected: Mutex<Vec<(JobId, JobOutputs)>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries so far, in arrival order.
    pub fn collected(&self) -> Vec<(JobId, JobOutputs)> {
        match self.collected.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn proposal(&self, job: &JobId) -> Option<String> {
        self.collected()
            .into_iter()
            .find(|(id, _)| id == job)
            .and_then(|(_, outputs)| outputs.proposal)
    }
}

#[async_trait]
impl ResultSink for CollectorSink {
    async fn deliver(&self, job: &JobId, outputs: &JobOutputs) -> Result<()> {
        let mut collected = match self.collected.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        collected.push((job.clone(), outputs.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Writes proposals (and optionally the intermediate texts) to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink {
    pub include_intermediate: bool,
}

impl StdoutSink {
    pub fn new(include_intermediate: bool) -> Self {
        Self {
            include_intermediate,
        }
    }

    fn render(&self, job: &JobId, outputs: &JobOutputs) -> String {
        let mut out = String::new();
        if self.include_intermediate {
            if let Some(text) = &outputs.source_text {
                out.push_str(&format!("===== {job}: transcript =====\n{text}\n\n"));
            }
            if let Some(text) = &outputs.analysis {
                out.push_str(&format!("===== {job}: analysis =====\n{text}\n\n"));
            }
        }
        if let Some(text) = &outputs.proposal {
            out.push_str(&format!("===== {job}: proposal =====\n{text}\n"));
        }
        out
    }
}

#[async_trait]
impl ResultSink for StdoutSink {
    async fn deliver(&self, job: &JobId, outputs: &JobOutputs) -> Result<()> {
        println!("{}", self.render(job, outputs));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

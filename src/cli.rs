//! Command-line interface for proposal-engine
//!
//! Argument parsing with clap derive macros, plus the batch manifest format
//! read by `run`.

use crate::audio::AudioClip;
use crate::error::{EngineError, Result};
use crate::pipeline::Job;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Recordings and documents in, business proposals out
#[derive(Parser, Debug)]
#[command(name = "proposal-engine", version, about = "Recordings and documents in, business proposals out")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose logging (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Jobs run at the same time (overrides batch.concurrency_limit)
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every job in a manifest
    Run {
        /// TOML manifest with one [[jobs]] table per job
        manifest: PathBuf,

        /// Also print transcripts and analyses
        #[arg(long)]
        intermediate: bool,

        /// Print the batch report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List known models with prices
    Models {
        /// Only show this provider's models
        #[arg(long, value_name = "PROVIDER")]
        provider: Option<String>,
    },

    /// List built-in prompt templates and their variables
    Templates {
        /// transcription, analysis or proposal
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,
    },

    /// Show how a recording of the given length would be chunked
    Plan {
        /// Recording length. Examples: 45m, 1h30m, 5400
        #[arg(value_parser = parse_duration)]
        duration: Duration,
    },
}

/// Parse a duration string.
///
/// Supports any format accepted by `humantime`, and bare numbers as seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Batch description read by `run`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Manifest {
    pub jobs: Vec<ManifestJob>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ManifestJob {
    pub id: String,
    /// WAV recording.
    pub audio: Option<PathBuf>,
    /// Plain-text document.
    pub document: Option<PathBuf>,
    pub analysis_template: Option<String>,
    pub proposal_template: Option<String>,
    /// Text files concatenated into the capability documents.
    #[serde(default)]
    pub capability_docs: Vec<PathBuf>,
    pub client_profile: Option<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| EngineError::InvalidInput {
            message: format!("cannot read manifest {}: {e}", path.display()),
        })?;
        let manifest: Manifest = toml::from_str(&contents)?;
        Ok(manifest)
    }

    /// Reads every referenced file; relative paths resolve against `base`.
    pub fn into_jobs(self, base: &Path) -> Result<Vec<Job>> {
        self.jobs.into_iter().map(|j| j.into_job(base)).collect()
    }
}

impl ManifestJob {
    fn into_job(self, base: &Path) -> Result<Job> {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        let read_text = |p: &Path| {
            let path = resolve(p);
            fs::read_to_string(&path).map_err(|e| EngineError::InvalidInput {
                message: format!("job {}: cannot read {}: {e}", self.id, path.display()),
            })
        };

        let mut job = match (&self.audio, &self.document) {
            (Some(audio), None) => Job::audio(&self.id, AudioClip::open(&resolve(audio))?),
            (None, Some(document)) => Job::document(&self.id, read_text(document)?),
            _ => {
                return Err(EngineError::InvalidInput {
                    message: format!("job {} needs exactly one of audio or document", self.id),
                });
            }
        };

        if let Some(name) = &self.analysis_template {
            job = job.with_analysis_template(name);
        }
        if let Some(name) = &self.proposal_template {
            job = job.with_proposal_template(name);
        }
        if !self.capability_docs.is_empty() {
            let docs = self
                .capability_docs
                .iter()
                .map(|p| read_text(p))
                .collect::<Result<Vec<_>>>()?;
            job = job.with_capability_docs(docs.join("\n\n"));
        }
        if let Some(profile) = &self.client_profile {
            job = job.with_client_profile(profile.as_str());
        }
        Ok(job)
    }
}

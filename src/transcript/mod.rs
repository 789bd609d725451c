//! Long-audio transcription: window planning, per-window parsing, speaker
//! reconciliation across boundaries and reassembly into one transcript.

pub mod engine;
pub mod parse;
pub mod planner;
pub mod reassembler;
pub mod speakers;
pub mod types;

pub use engine::{TranscriptionEngine, TranscriptionOutput};
pub use parse::parse_transcript;
pub use planner::{ChunkPlan, ChunkWindow};
pub use reassembler::{ChunkOutcome, reassemble};
pub use speakers::{MatchThresholds, match_speakers, text_similarity};
pub use types::{
    Chunk, ChunkFailure, LocalUtterance, SpeakerId, TimeRange, Transcript, TranscriptEntry,
    Utterance, format_timestamp,
};

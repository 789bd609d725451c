use crate::error::ErrorKind;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Half-open time span `[start, end)` measured from the start of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimeRange {
    pub start: Duration,
    pub end: Duration,
}

impl TimeRange {
    /// `end` is raised to `start` if it falls before it.
    pub fn new(start: Duration, end: Duration) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn from_secs(start: u64, end: u64) -> Self {
        Self::new(Duration::from_secs(start), Duration::from_secs(end))
    }

    pub fn len(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn midpoint(&self) -> Duration {
        self.start + self.len() / 2
    }

    pub fn intersection(&self, other: &TimeRange) -> Duration {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        !self.intersection(other).is_zero()
            || (self.is_empty() && other.start <= self.start && self.start < other.end)
    }

    /// Intersection divided by the shorter of the two lengths.
    pub fn overlap_ratio(&self, other: &TimeRange) -> f64 {
        let shorter = self.len().min(other.len());
        if shorter.is_zero() {
            return 0.0;
        }
        self.intersection(other).as_secs_f64() / shorter.as_secs_f64()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {}]",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

/// `hh:mm:ss`
pub fn format_timestamp(at: Duration) -> String {
    let secs = at.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Transcript-wide speaker identity, displayed as `Speaker N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SpeakerId(pub u32);

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Speaker {}", self.0)
    }
}

/// One utterance as the model reported it for a single chunk.
///
/// `speaker` is the chunk-local diarization tag; the same tag in two chunks
/// need not be the same person.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalUtterance {
    pub speaker: Option<String>,
    pub text: String,
    /// Absolute position in the input.
    pub range: TimeRange,
}

/// A transcribed audio window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub range: TimeRange,
    pub overlap_with_previous: Duration,
    pub raw_text: String,
    pub utterances: Vec<LocalUtterance>,
}

impl Chunk {
    /// Distinct local tags in order of first appearance.
    pub fn speaker_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = Vec::new();
        for tag in self.utterances.iter().filter_map(|u| u.speaker.as_deref()) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}

/// A window whose transcription failed after the Gateway's retries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub range: TimeRange,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub speaker: Option<SpeakerId>,
    pub text: String,
    pub range: TimeRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TranscriptEntry {
    Speech(Utterance),
    /// Span whose chunk could not be transcribed.
    Gap { range: TimeRange, chunk: usize },
}

impl TranscriptEntry {
    pub fn range(&self) -> TimeRange {
        match self {
            TranscriptEntry::Speech(u) => u.range,
            TranscriptEntry::Gap { range, .. } => *range,
        }
    }
}

/// Merged transcript of a whole input, ordered by time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub duration: Duration,
    pub entries: Vec<TranscriptEntry>,
    /// Span each chunk is responsible for; these partition `[0, duration]`.
    pub owned_spans: Vec<TimeRange>,
    pub failures: Vec<ChunkFailure>,
}

impl Transcript {
    pub fn utterances(&self) -> impl Iterator<Item = &Utterance> {
        self.entries.iter().filter_map(|e| match e {
            TranscriptEntry::Speech(u) => Some(u),
            TranscriptEntry::Gap { .. } => None,
        })
    }

    /// Distinct speakers in order of first appearance.
    pub fn speakers(&self) -> Vec<SpeakerId> {
        let mut speakers = Vec::new();
        for id in self.utterances().filter_map(|u| u.speaker) {
            if !speakers.contains(&id) {
                speakers.push(id);
            }
        }
        speakers
    }

    pub fn chunk_count(&self) -> usize {
        self.owned_spans.len()
    }

    /// Some chunk failed and left a gap.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Summary header followed by one line per entry.
    pub fn render_text(&self) -> String {
        let speakers = self.speakers();
        let mut out = format!("Transcript duration: {}\n", format_timestamp(self.duration));
        if speakers.is_empty() {
            out.push_str("Speakers: none identified\n");
        } else {
            let names: Vec<String> = speakers.iter().map(ToString::to_string).collect();
            out.push_str(&format!(
                "Speakers: {} ({})\n",
                speakers.len(),
                names.join(", ")
            ));
        }
        if self.is_partial() {
            out.push_str(&format!(
                "Note: {} of {} segments could not be transcribed; gaps are marked below.\n",
                self.failures.len(),
                self.chunk_count()
            ));
        }
        out.push('\n');

        for entry in &self.entries {
            match entry {
                TranscriptEntry::Speech(u) => match u.speaker {
                    Some(id) => out.push_str(&format!("{} {}: {}\n", u.range, id, u.text)),
                    None => out.push_str(&format!("{} {}\n", u.range, u.text)),
                },
                TranscriptEntry::Gap { range, .. } => {
                    out.push_str(&format!("{range} [untranscribed segment]\n"));
                }
            }
        }
        out
    }
}

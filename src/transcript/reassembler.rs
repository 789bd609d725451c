//! Merging per-chunk transcripts into one time-ordered transcript.

use crate::transcript::planner::ChunkPlan;
use crate::transcript::speakers::{MatchThresholds, match_speakers, text_similarity};
use crate::transcript::types::{
    Chunk, ChunkFailure, LocalUtterance, SpeakerId, TimeRange, Transcript, TranscriptEntry,
    Utterance,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// Result of transcribing one planned window.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Transcribed(Chunk),
    Failed(ChunkFailure),
}

impl ChunkOutcome {
    pub fn index(&self) -> usize {
        match self {
            ChunkOutcome::Transcribed(c) => c.index,
            ChunkOutcome::Failed(f) => f.index,
        }
    }
}

/// Builds the transcript for `plan` from one outcome per window.
///
/// Each chunk only contributes utterances whose midpoint lies in its owned
/// span, clipped so entries never overlap. Local tags are carried across a
/// boundary when [`match_speakers`] pairs them; a chunk following a failed
/// one starts with fresh speakers. Speakers are numbered by first appearance.
pub fn reassemble(
    plan: &ChunkPlan,
    mut outcomes: Vec<ChunkOutcome>,
    thresholds: MatchThresholds,
) -> Transcript {
    outcomes.sort_by_key(ChunkOutcome::index);
    let owned = plan.owned_spans();

    let mut next_internal = 0u32;
    let mut entries: Vec<TranscriptEntry> = Vec::new();
    let mut failures = Vec::new();
    let mut last_end = Duration::ZERO;
    // Previous chunk and its tag -> internal speaker map, if it was transcribed.
    let mut previous: Option<(&Chunk, BTreeMap<String, u32>)> = None;
    // Entries the previous chunk emitted, with that chunk's reading of each.
    let mut previous_emitted: Vec<(usize, &LocalUtterance)> = Vec::new();

    for outcome in &outcomes {
        let Some(span) = owned.get(outcome.index()).copied() else {
            tracing::warn!(index = outcome.index(), "Chunk outside plan ignored");
            continue;
        };

        let chunk = match outcome {
            ChunkOutcome::Failed(failure) => {
                entries.push(TranscriptEntry::Gap {
                    range: TimeRange::new(span.start.max(last_end), span.end),
                    chunk: failure.index,
                });
                last_end = last_end.max(span.end);
                failures.push(failure.clone());
                previous = None;
                previous_emitted.clear();
                continue;
            }
            ChunkOutcome::Transcribed(chunk) => chunk,
        };

        let boundary = match &previous {
            Some((prev_chunk, _)) if prev_chunk.index + 1 == chunk.index => {
                plan.overlap_before(chunk.index)
            }
            _ => None,
        };
        let carried: BTreeMap<String, u32> = match (&previous, boundary) {
            (Some((prev_chunk, prev_map)), Some(overlap)) => {
                match_speakers(&prev_chunk.utterances, &chunk.utterances, overlap, thresholds)
                    .into_iter()
                    .filter_map(|(tag, prev_tag)| prev_map.get(&prev_tag).map(|&id| (tag, id)))
                    .collect()
            }
            _ => BTreeMap::new(),
        };
        if boundary.is_none() {
            previous_emitted.clear();
        }
        let mut emitted: Vec<(usize, &LocalUtterance)> = Vec::new();

        let mut map: BTreeMap<String, u32> = BTreeMap::new();
        for tag in chunk.speaker_tags() {
            let id = match carried.get(tag) {
                Some(&id) => id,
                None => {
                    next_internal += 1;
                    next_internal
                }
            };
            map.insert(tag.to_string(), id);
        }

        let mut utterances: Vec<_> = chunk.utterances.iter().collect();
        utterances.sort_by_key(|u| u.range.start);
        let is_last = chunk.index + 1 == owned.len();
        for u in utterances {
            let mid = u.range.midpoint();
            let owns = span.start <= mid && (mid < span.end || (is_last && mid <= span.end));
            if !owns {
                continue;
            }

            // Both chunks may claim a boundary utterance when their timings
            // drift across the cut; keep the earlier copy and widen it.
            if let Some(overlap) = boundary
                && u.range.intersects(&overlap)
                && let Some(pos) = previous_emitted.iter().position(|(_, p)| {
                    p.range.intersects(&overlap) && same_utterance(p, u, thresholds)
                })
            {
                let (entry, _) = previous_emitted.swap_remove(pos);
                if entry + 1 == entries.len()
                    && let Some(TranscriptEntry::Speech(prev)) = entries.last_mut()
                {
                    let end = u.range.end.min(span.end);
                    if end > prev.range.end {
                        prev.range.end = end;
                        last_end = last_end.max(end);
                    }
                }
                tracing::debug!(chunk = chunk.index, "Dropped repeated overlap utterance");
                continue;
            }
            let speaker = u.speaker.as_ref().and_then(|t| map.get(t)).copied();
            let range = TimeRange::new(
                u.range.start.max(span.start).max(last_end),
                u.range.end.min(span.end),
            );
            if range.is_empty() {
                if let Some(TranscriptEntry::Speech(prev)) = entries.last_mut()
                    && prev.speaker.map(|s| s.0) == speaker
                {
                    prev.text.push(' ');
                    prev.text.push_str(&u.text);
                } else {
                    tracing::debug!(chunk = chunk.index, "Dropped zero-length utterance");
                }
                continue;
            }
            last_end = range.end;
            entries.push(TranscriptEntry::Speech(Utterance {
                speaker: speaker.map(SpeakerId),
                text: u.text.clone(),
                range,
            }));
            emitted.push((entries.len() - 1, u));
        }

        previous = Some((chunk, map));
        previous_emitted = emitted;
    }

    renumber_by_first_appearance(&mut entries);

    Transcript {
        duration: plan.duration,
        entries,
        owned_spans: owned,
        failures,
    }
}

/// Two chunks' readings of one utterance, under the speaker-matching thresholds.
fn same_utterance(a: &LocalUtterance, b: &LocalUtterance, thresholds: MatchThresholds) -> bool {
    a.range.overlap_ratio(&b.range) >= thresholds.min_time_overlap
        && text_similarity(&a.text, &b.text) >= thresholds.min_text_similarity
}

fn renumber_by_first_appearance(entries: &mut [TranscriptEntry]) {
    let mut order: BTreeMap<u32, u32> = BTreeMap::new();
    for entry in entries.iter_mut() {
        if let TranscriptEntry::Speech(u) = entry
            && let Some(SpeakerId(internal)) = u.speaker
        {
            let next = order.len() as u32 + 1;
            let id = *order.entry(internal).or_insert(next);
            u.speaker = Some(SpeakerId(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transcript::types::LocalUtterance;

    fn u(tag: &str, text: &str, start: u64, end: u64) -> LocalUtterance {
        LocalUtterance {
            speaker: Some(tag.to_string()),
            text: text.to_string(),
            range: TimeRange::from_secs(start, end),
        }
    }

    fn chunk(plan: &ChunkPlan, index: usize, utterances: Vec<LocalUtterance>) -> ChunkOutcome {
        let w = &plan.windows[index];
        ChunkOutcome::Transcribed(Chunk {
            index,
            range: w.range,
            overlap_with_previous: w.overlap_with_previous,
            raw_text: String::new(),
            utterances,
        })
    }

    fn failed(plan: &ChunkPlan, index: usize) -> ChunkOutcome {
        ChunkOutcome::Failed(ChunkFailure {
            index,
            range: plan.windows[index].range,
            kind: ErrorKind::Transient,
            message: "503".to_string(),
        })
    }

    /// 250s, windows [0,100] [90,190] [180,250]; cuts at 95 and 185.
    fn plan() -> ChunkPlan {
        ChunkPlan::windowed(Duration::from_secs(250), Duration::from_secs(100), Duration::from_secs(10))
    }

    fn assert_ordered_and_disjoint(transcript: &Transcript) {
        for pair in transcript.entries.windows(2) {
            let (a, b) = (pair[0].range(), pair[1].range());
            assert!(a.start < b.start, "{a} then {b}");
            assert!(a.end <= b.start, "{a} overlaps {b}");
        }
    }

    #[test]
    fn single_speaker_carried_across_all_boundaries() {
        let plan = plan();
        let outcomes = vec![
            chunk(
                &plan,
                0,
                vec![
                    u("A", "opening remarks", 0, 50),
                    u("A", "moving on to pricing now", 88, 98),
                ],
            ),
            chunk(
                &plan,
                1,
                vec![
                    u("B", "moving on to pricing now", 90, 98),
                    u("B", "the discount question", 100, 150),
                    u("B", "let us wrap up the quarter", 182, 189),
                ],
            ),
            chunk(
                &plan,
                2,
                vec![
                    u("C", "let us wrap up the quarter", 182, 189),
                    u("C", "thank you", 200, 240),
                ],
            ),
        ];
        let transcript = reassemble(&plan, outcomes, MatchThresholds::default());
        assert_eq!(transcript.speakers(), vec![SpeakerId(1)]);
        assert_eq!(transcript.utterances().count(), 5);
        assert_ordered_and_disjoint(&transcript);
    }

    #[test]
    fn overlap_text_emitted_once() {
        let plan = plan();
        let outcomes = vec![
            chunk(&plan, 0, vec![u("A", "boundary sentence", 91, 97)]),
            chunk(&plan, 1, vec![u("A", "boundary sentence", 91, 97)]),
            chunk(&plan, 2, vec![]),
        ];
        let transcript = reassemble(&plan, outcomes, MatchThresholds::default());
        let texts: Vec<_> = transcript.utterances().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["boundary sentence"]);
        assert_eq!(transcript.utterances().next().unwrap().range, TimeRange::from_secs(91, 95));
    }

    #[test]
    fn drifting_boundary_timings_emit_sentence_once() {
        let plan = plan();
        // Midpoints 92 and 96 fall on both sides of the cut at 95.
        let outcomes = vec![
            chunk(
                &plan,
                0,
                vec![
                    u("A", "opening", 10, 40),
                    u("A", "moving on to pricing now", 88, 96),
                ],
            ),
            chunk(
                &plan,
                1,
                vec![
                    u("B", "moving on to pricing now", 93, 99),
                    u("B", "the discount question", 100, 150),
                ],
            ),
            chunk(&plan, 2, vec![]),
        ];
        let transcript = reassemble(&plan, outcomes, MatchThresholds::default());

        let entries: Vec<_> = transcript
            .utterances()
            .map(|u| (u.text.as_str(), u.range))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("opening", TimeRange::from_secs(10, 40)),
                ("moving on to pricing now", TimeRange::from_secs(88, 99)),
                ("the discount question", TimeRange::from_secs(100, 150)),
            ]
        );
        assert_eq!(transcript.speakers(), vec![SpeakerId(1)]);
        assert_ordered_and_disjoint(&transcript);
    }

    #[test]
    fn distinct_sentences_near_the_cut_are_both_kept() {
        let plan = plan();
        let outcomes = vec![
            chunk(&plan, 0, vec![u("A", "we can start in may", 88, 94)]),
            chunk(&plan, 1, vec![u("A", "budget is fixed for this year", 95, 99)]),
            chunk(&plan, 2, vec![]),
        ];
        let transcript = reassemble(&plan, outcomes, MatchThresholds::default());
        assert_eq!(transcript.utterances().count(), 2);
        assert_ordered_and_disjoint(&transcript);
    }

    #[test]
    fn unmatched_tags_become_new_speakers() {
        let plan = plan();
        let outcomes = vec![
            chunk(&plan, 0, vec![u("A", "first part", 10, 20)]),
            chunk(&plan, 1, vec![u("A", "something unrelated", 120, 130)]),
            chunk(&plan, 2, vec![u("A", "closing", 200, 210)]),
        ];
        let transcript = reassemble(&plan, outcomes, MatchThresholds::default());
        assert_eq!(
            transcript.speakers(),
            vec![SpeakerId(1), SpeakerId(2), SpeakerId(3)]
        );
    }

    #[test]
    fn failed_chunk_leaves_gap_and_resets_speakers() {
        let plan = plan();
        let outcomes = vec![
            chunk(&plan, 0, vec![u("A", "hello", 0, 10)]),
            failed(&plan, 1),
            chunk(&plan, 2, vec![u("A", "hello", 186, 190)]),
        ];
        let transcript = reassemble(&plan, outcomes, MatchThresholds::default());
        assert!(transcript.is_partial());
        assert_eq!(transcript.failures.len(), 1);
        assert!(transcript.entries.iter().any(|e| matches!(
            e,
            TranscriptEntry::Gap { range, chunk: 1 } if *range == TimeRange::from_secs(95, 185)
        )));
        assert_eq!(transcript.speakers().len(), 2);
        assert_ordered_and_disjoint(&transcript);
        assert!(transcript.render_text().contains("[untranscribed segment]"));
    }

    #[test]
    fn outcomes_in_completion_order_are_sorted() {
        let plan = plan();
        let outcomes = vec![
            chunk(&plan, 2, vec![u("A", "late", 200, 210)]),
            chunk(&plan, 0, vec![u("A", "early", 0, 10)]),
            chunk(&plan, 1, vec![u("A", "middle", 120, 130)]),
        ];
        let transcript = reassemble(&plan, outcomes, MatchThresholds::default());
        let texts: Vec<_> = transcript.utterances().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["early", "middle", "late"]);
    }

    #[test]
    fn single_window_keeps_everything() {
        let plan = ChunkPlan::single(Duration::from_secs(60));
        let outcomes = vec![chunk(
            &plan,
            0,
            vec![u("B", "hi", 0, 5), u("A", "hello", 5, 10), u("B", "bye", 55, 60)],
        )];
        let transcript = reassemble(&plan, outcomes, MatchThresholds::default());
        assert_eq!(transcript.utterances().count(), 3);
        assert_eq!(transcript.speakers(), vec![SpeakerId(1), SpeakerId(2)]);
        assert_eq!(transcript.utterances().next().unwrap().speaker, Some(SpeakerId(1)));
    }

    #[test]
    fn owned_spans_cover_duration() {
        let plan = plan();
        let transcript = reassemble(&plan, vec![], MatchThresholds::default());
        assert_eq!(transcript.owned_spans.first().unwrap().start, Duration::ZERO);
        assert_eq!(transcript.owned_spans.last().unwrap().end, Duration::from_secs(250));
    }
}

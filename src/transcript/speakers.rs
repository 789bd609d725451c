//! Cross-chunk speaker reconciliation over an overlap window.
//!
//! Two utterances from either side of a boundary are taken to be the same
//! speech when their time ranges overlap by at least `min_time_overlap` of
//! the shorter one and their texts are at least `min_text_similarity`
//! alike. Every such pair votes, with its similarity, for mapping the next
//! chunk's tag onto the previous chunk's tag.

use crate::config::ChunkingConfig;
use crate::transcript::types::{LocalUtterance, TimeRange};
use std::collections::{BTreeMap, BTreeSet};

/// Scores closer than this count as a tie.
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    pub min_time_overlap: f64,
    pub min_text_similarity: f64,
}

impl From<&ChunkingConfig> for MatchThresholds {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            min_time_overlap: config.min_time_overlap,
            min_text_similarity: config.min_text_similarity,
        }
    }
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self::from(&ChunkingConfig::default())
    }
}

/// Maps next-chunk tags to previous-chunk tags.
///
/// A next tag whose two best candidates score the same is ambiguous and left
/// out. The rest are assigned one-to-one by descending score, ties broken by
/// tag order. Tags absent from the result are new speakers.
pub fn match_speakers(
    previous: &[LocalUtterance],
    next: &[LocalUtterance],
    overlap: TimeRange,
    thresholds: MatchThresholds,
) -> BTreeMap<String, String> {
    let in_overlap = |u: &&LocalUtterance| u.speaker.is_some() && u.range.intersects(&overlap);
    let prev: Vec<&LocalUtterance> = previous.iter().filter(in_overlap).collect();
    let cur: Vec<&LocalUtterance> = next.iter().filter(in_overlap).collect();

    let mut scores: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for n in &cur {
        for p in &prev {
            let (Some(next_tag), Some(prev_tag)) = (n.speaker.as_deref(), p.speaker.as_deref())
            else {
                continue;
            };
            if n.range.overlap_ratio(&p.range) < thresholds.min_time_overlap {
                continue;
            }
            let similarity = text_similarity(&n.text, &p.text);
            if similarity < thresholds.min_text_similarity {
                continue;
            }
            *scores.entry((next_tag, prev_tag)).or_default() += similarity;
        }
    }

    let mut by_next: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
    for (&(next_tag, prev_tag), &score) in &scores {
        by_next.entry(next_tag).or_default().push((prev_tag, score));
    }

    let mut candidates: Vec<(f64, &str, &str)> = Vec::new();
    for (next_tag, mut options) in by_next {
        options.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
        if options.len() > 1 && (options[0].1 - options[1].1).abs() < SCORE_EPSILON {
            tracing::debug!(tag = next_tag, "Ambiguous speaker overlap, treating as new speaker");
            continue;
        }
        candidates.extend(options.into_iter().map(|(prev_tag, s)| (s, next_tag, prev_tag)));
    }
    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then(a.1.cmp(b.1))
            .then(a.2.cmp(b.2))
    });

    let mut used_prev: BTreeSet<&str> = BTreeSet::new();
    let mut mapping = BTreeMap::new();
    for (_, next_tag, prev_tag) in candidates {
        if mapping.contains_key(next_tag) || used_prev.contains(prev_tag) {
            continue;
        }
        used_prev.insert(prev_tag);
        mapping.insert(next_tag.to_string(), prev_tag.to_string());
    }
    mapping
}

/// Larger of normalised edit similarity and word containment, in `[0, 1]`.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a_tokens = tokens(a);
    let b_tokens = tokens(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }

    let a_norm = a_tokens.join(" ");
    let b_norm = b_tokens.join(" ");
    let longest = a_norm.chars().count().max(b_norm.chars().count());
    let edit = 1.0 - edit_distance(&a_norm, &b_norm) as f64 / longest as f64;

    let a_set: BTreeSet<&str> = a_tokens.iter().map(String::as_str).collect();
    let b_set: BTreeSet<&str> = b_tokens.iter().map(String::as_str).collect();
    let shared = a_set.intersection(&b_set).count();
    let containment = shared as f64 / a_set.len().min(b_set.len()) as f64;

    edit.max(containment)
}

/// Lowercased words without punctuation; CJK characters are one token each.
fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                out.push(std::mem::take(&mut word));
            }
            out.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            out.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(tag: &str, text: &str, start: u64, end: u64) -> LocalUtterance {
        LocalUtterance {
            speaker: Some(tag.to_string()),
            text: text.to_string(),
            range: TimeRange::from_secs(start, end),
        }
    }

    fn overlap() -> TimeRange {
        TimeRange::from_secs(90, 100)
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
    }

    #[test]
    fn similarity_ignores_case_and_punctuation() {
        assert!((text_similarity("Hello, World!", "hello world") - 1.0).abs() < 1e-9);
        assert_eq!(text_similarity("", "hello"), 0.0);
        assert!(text_similarity("budget review", "weather tomorrow") < 0.5);
    }

    #[test]
    fn similarity_word_containment_handles_cut_off_text() {
        let whole = "we should finalize the budget before friday";
        let cut = "finalize the budget";
        assert!((text_similarity(whole, cut) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn similarity_cjk_per_character() {
        assert!(text_similarity("我们明天开会", "明天开会") >= 0.99);
    }

    #[test]
    fn matching_tags_are_mapped() {
        let previous = vec![
            u("A", "so the plan is settled", 85, 95),
            u("B", "great thanks everyone", 95, 100),
        ];
        let next = vec![
            u("X", "so the plan is settled", 90, 95),
            u("Y", "great thanks everyone", 95, 100),
        ];
        let mapping = match_speakers(&previous, &next, overlap(), MatchThresholds::default());
        assert_eq!(mapping.get("X").map(String::as_str), Some("A"));
        assert_eq!(mapping.get("Y").map(String::as_str), Some("B"));
    }

    #[test]
    fn dissimilar_text_is_not_matched() {
        let previous = vec![u("A", "the quarterly numbers look fine", 90, 100)];
        let next = vec![u("A", "let us talk about hiring", 90, 100)];
        assert!(match_speakers(&previous, &next, overlap(), MatchThresholds::default()).is_empty());
    }

    #[test]
    fn distant_times_are_not_matched() {
        let previous = vec![u("A", "same words here", 90, 92)];
        let next = vec![u("A", "same words here", 97, 100)];
        assert!(match_speakers(&previous, &next, overlap(), MatchThresholds::default()).is_empty());
    }

    #[test]
    fn utterances_outside_overlap_are_ignored() {
        let previous = vec![u("A", "identical sentence", 10, 20)];
        let next = vec![u("B", "identical sentence", 10, 20)];
        assert!(match_speakers(&previous, &next, overlap(), MatchThresholds::default()).is_empty());
    }

    #[test]
    fn tie_between_candidates_is_ambiguous() {
        let previous = vec![u("A", "yes exactly", 90, 95), u("B", "yes exactly", 90, 95)];
        let next = vec![u("X", "yes exactly", 90, 95)];
        assert!(match_speakers(&previous, &next, overlap(), MatchThresholds::default()).is_empty());
    }

    #[test]
    fn assignment_is_one_to_one() {
        let previous = vec![u("A", "we agree on the scope", 90, 100)];
        let next = vec![
            u("X", "we agree on the scope", 90, 100),
            u("Y", "we agree on the scope today", 90, 100),
        ];
        let mapping = match_speakers(&previous, &next, overlap(), MatchThresholds::default());
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("X").map(String::as_str), Some("A"));
    }

    #[test]
    fn equal_scores_across_tags_prefer_tag_order() {
        let previous = vec![u("A", "okay", 90, 95)];
        let next = vec![u("Y", "okay", 90, 95), u("X", "okay", 90, 95)];
        let mapping = match_speakers(&previous, &next, overlap(), MatchThresholds::default());
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("X").map(String::as_str), Some("A"));
    }
}

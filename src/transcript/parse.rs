//! Parsing model transcription output into timed utterances.
//!
//! Expected line shape: `[mm:ss - mm:ss] Speaker A: text`. Timestamps are
//! optional and relative to the window; `hh:mm:ss` is accepted; labels may
//! use `Speaker`, `说话人` or `发言人` with `:` or `：`.

use crate::transcript::types::{LocalUtterance, TimeRange};
use std::time::Duration;

const SPEAKER_PREFIXES: [&str; 3] = ["Speaker", "说话人", "发言人"];
/// Longest tag accepted after a speaker prefix.
const MAX_TAG_CHARS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
struct ParsedLine {
    start: Option<Duration>,
    end: Option<Duration>,
    speaker: Option<String>,
    text: String,
}

/// Parses the model's output for `window` into utterances with absolute times.
///
/// Lines without timestamps share the window span in proportion to their
/// text length; lines without a label continue the previous speaker.
pub fn parse_transcript(raw: &str, window: TimeRange) -> Vec<LocalUtterance> {
    let mut lines: Vec<ParsedLine> = raw.lines().filter_map(parse_line).collect();

    let mut current: Option<String> = None;
    for line in &mut lines {
        match &line.speaker {
            Some(tag) => current = Some(tag.clone()),
            None => line.speaker = current.clone(),
        }
    }

    let ranges = if lines.iter().any(|l| l.start.is_some()) {
        timed_ranges(&lines, window)
    } else {
        proportional_ranges(&lines, window)
    };

    lines
        .into_iter()
        .zip(ranges)
        .map(|(line, range)| LocalUtterance {
            speaker: line.speaker,
            text: line.text,
            range,
        })
        .collect()
}

/// Resolves relative timestamps; missing starts continue from the previous
/// line and missing ends run to the next line's start.
fn timed_ranges(lines: &[ParsedLine], window: TimeRange) -> Vec<TimeRange> {
    let clamp = |offset: Duration| (window.start + offset).min(window.end);

    let mut starts = Vec::with_capacity(lines.len());
    let mut floor = window.start;
    for line in lines {
        let start = line.start.map(clamp).unwrap_or(floor).max(floor);
        starts.push(start);
        floor = line.end.map(clamp).unwrap_or(start).max(start);
    }

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let start = starts[i];
            let next_start = starts.get(i + 1).copied().unwrap_or(window.end);
            let end = line.end.map(clamp).unwrap_or(next_start);
            TimeRange::new(start, end)
        })
        .collect()
}

fn proportional_ranges(lines: &[ParsedLine], window: TimeRange) -> Vec<TimeRange> {
    let weights: Vec<u64> = lines
        .iter()
        .map(|l| l.text.chars().count().max(1) as u64)
        .collect();
    let total: u64 = weights.iter().sum();
    let span = window.len().as_millis() as u64;

    let mut acc = 0u64;
    weights
        .iter()
        .map(|w| {
            let start = window.start + Duration::from_millis(span * acc / total);
            acc += w;
            let end = window.start + Duration::from_millis(span * acc / total);
            TimeRange::new(start, end)
        })
        .collect()
}

fn parse_line(raw: &str) -> Option<ParsedLine> {
    let mut rest = raw.trim().trim_start_matches(['-', '*', '•']).trim();
    if rest.is_empty() {
        return None;
    }

    let (mut start, mut end) = (None, None);
    if let Some(inner) = rest.strip_prefix('[')
        && let Some(close) = inner.find(']')
    {
        let stamp = &inner[..close];
        if let Some((s, e)) = parse_stamp_range(stamp) {
            start = Some(s);
            end = e;
            rest = inner[close + 1..].trim();
        } else if looks_like_stamp(stamp) {
            rest = inner[close + 1..].trim();
        }
    }

    let (speaker, text) = match split_speaker(rest) {
        Some((tag, text)) => (Some(tag), text),
        None => (None, rest),
    };
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(ParsedLine {
        start,
        end,
        speaker,
        text: text.to_string(),
    })
}

/// `mm:ss - mm:ss`, `hh:mm:ss-hh:mm:ss` or a single stamp.
fn parse_stamp_range(inner: &str) -> Option<(Duration, Option<Duration>)> {
    let mut parts = inner.split(['-', '–', '~']).map(str::trim);
    let start = parse_stamp(parts.next()?)?;
    let end = match parts.next() {
        Some(e) => Some(parse_stamp(e)?),
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((start, end))
}

/// Digits and separators only, so an unusable stamp is dropped, not kept as text.
fn looks_like_stamp(inner: &str) -> bool {
    inner.contains(':')
        && inner
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ':' | '.' | '-' | '–' | '~' | ' '))
}

fn parse_stamp(stamp: &str) -> Option<Duration> {
    let fields: Vec<&str> = stamp.split(':').collect();
    if !(2..=3).contains(&fields.len()) {
        return None;
    }
    let (whole, millis) = match fields[fields.len() - 1].split_once('.') {
        Some((secs, frac)) => {
            let digits: String = frac.chars().take(3).collect();
            let scale = 10u64.pow(3 - digits.len() as u32);
            (secs, digits.parse::<u64>().ok()? * scale)
        }
        None => (fields[fields.len() - 1], 0),
    };
    let seconds: u64 = whole.parse().ok()?;
    let minutes: u64 = fields[fields.len() - 2].parse().ok()?;
    let hours: u64 = if fields.len() == 3 {
        fields[0].parse().ok()?
    } else {
        0
    };
    // Model output is untrusted; absurd stamps make the line untimed.
    let total = hours
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(1000)?
        .checked_add(millis)?;
    Some(Duration::from_millis(total))
}

/// Splits `Speaker A: text` into `("A", "text")`.
fn split_speaker(line: &str) -> Option<(String, &str)> {
    let line = line.trim_start_matches('*');
    let prefix = SPEAKER_PREFIXES
        .iter()
        .find(|p| line.starts_with(*p))?;
    let after = &line[prefix.len()..];
    let (sep_at, sep_len) = [':', '：']
        .iter()
        .filter_map(|c| after.find(*c).map(|i| (i, c.len_utf8())))
        .min_by_key(|(i, _)| *i)?;
    let tag = after[..sep_at].trim().trim_end_matches('*').trim();
    if tag.is_empty() || tag.chars().count() > MAX_TAG_CHARS {
        return None;
    }
    let text = after[sep_at + sep_len..].trim_start_matches('*');
    Some((tag.to_string(), text))
}

//! Splitting an input duration into overlapping transcription windows.

use crate::config::ChunkingConfig;
use crate::transcript::types::TimeRange;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkWindow {
    pub index: usize,
    pub range: TimeRange,
    /// How much of this window repeats the end of the previous one.
    pub overlap_with_previous: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkPlan {
    pub duration: Duration,
    pub windows: Vec<ChunkWindow>,
}

impl ChunkPlan {
    /// One window over the whole input.
    pub fn single(duration: Duration) -> Self {
        Self {
            duration,
            windows: vec![ChunkWindow {
                index: 0,
                range: TimeRange::new(Duration::ZERO, duration),
                overlap_with_previous: Duration::ZERO,
            }],
        }
    }

    /// Single window at or below the threshold, overlapping windows above it.
    pub fn for_duration(duration: Duration, config: &ChunkingConfig) -> Self {
        if duration <= config.single_call_threshold() {
            Self::single(duration)
        } else {
            Self::windowed(duration, config.target_chunk(), config.overlap())
        }
    }

    /// `ceil((d - overlap) / (target - overlap))` windows; window `k` starts
    /// at `k * (target - overlap)` and ends at `min(start + target, d)`.
    ///
    /// Falls back to a single window when `overlap >= target`.
    pub fn windowed(duration: Duration, target: Duration, overlap: Duration) -> Self {
        let d = duration.as_millis() as u64;
        let t = target.as_millis() as u64;
        let o = overlap.as_millis() as u64;
        if o >= t || d <= t {
            return Self::single(duration);
        }

        let step = t - o;
        let count = (d - o).div_ceil(step);
        let mut windows: Vec<ChunkWindow> = Vec::with_capacity(count as usize);
        for k in 0..count {
            let start = k * step;
            let end = (start + t).min(d);
            let overlap_with_previous = windows
                .last()
                .map(|prev| prev.range.end.saturating_sub(Duration::from_millis(start)))
                .unwrap_or_default();
            windows.push(ChunkWindow {
                index: k as usize,
                range: TimeRange::new(Duration::from_millis(start), Duration::from_millis(end)),
                overlap_with_previous,
            });
        }
        Self { duration, windows }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn is_chunked(&self) -> bool {
        self.windows.len() > 1
    }

    /// Overlap region between window `index` and its predecessor.
    pub fn overlap_before(&self, index: usize) -> Option<TimeRange> {
        let prev = self.windows.get(index.checked_sub(1)?)?;
        let cur = self.windows.get(index)?;
        Some(TimeRange::new(cur.range.start, prev.range.end))
    }

    /// Span each window emits: consecutive windows are cut at the midpoint of
    /// their overlap, so the spans partition `[0, duration]`.
    pub fn owned_spans(&self) -> Vec<TimeRange> {
        let mut spans = Vec::with_capacity(self.windows.len());
        let mut start = Duration::ZERO;
        for (i, window) in self.windows.iter().enumerate() {
            let end = match self.windows.get(i + 1) {
                Some(next) => TimeRange::new(next.range.start, window.range.end).midpoint(),
                None => self.duration,
            };
            spans.push(TimeRange::new(start, end));
            start = end;
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn expected_count(d: u64, t: u64, o: u64) -> usize {
        (d - o).div_ceil(t - o) as usize
    }

    #[test]
    fn test_below_threshold_is_single_window() {
        let config = ChunkingConfig::default();
        let plan = ChunkPlan::for_duration(secs(1200), &config);
        assert_eq!(plan.len(), 1);
        assert!(!plan.is_chunked());
        assert_eq!(plan.windows[0].range, TimeRange::from_secs(0, 1200));
    }

    #[test]
    fn test_window_count_matches_formula() {
        for d in [1201u64, 2370, 2371, 3600, 7200, 10_000] {
            let plan = ChunkPlan::windowed(secs(d), secs(1200), secs(30));
            assert_eq!(plan.len(), expected_count(d, 1200, 30), "duration {d}");
        }
    }

    #[test]
    fn test_windows_cover_input() {
        let plan = ChunkPlan::windowed(secs(3600), secs(1200), secs(30));
        assert_eq!(plan.windows[0].range.start, Duration::ZERO);
        assert_eq!(plan.windows.last().unwrap().range.end, secs(3600));
        for pair in plan.windows.windows(2) {
            assert!(pair[1].range.start < pair[0].range.end);
            assert_eq!(pair[1].overlap_with_previous, secs(30));
        }
    }

    #[test]
    fn test_owned_spans_partition() {
        let plan = ChunkPlan::windowed(secs(3600), secs(1200), secs(30));
        let spans = plan.owned_spans();
        assert_eq!(spans.len(), plan.len());
        assert_eq!(spans[0].start, Duration::ZERO);
        assert_eq!(spans.last().unwrap().end, secs(3600));
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(spans[0].end, secs(1185));
    }

    #[test]
    fn test_overlap_before() {
        let plan = ChunkPlan::windowed(secs(250), secs(100), secs(10));
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.overlap_before(0), None);
        assert_eq!(plan.overlap_before(1), Some(TimeRange::from_secs(90, 100)));
        assert_eq!(plan.overlap_before(2), Some(TimeRange::from_secs(180, 190)));
    }

    #[test]
    fn test_degenerate_overlap_falls_back_to_single() {
        let plan = ChunkPlan::windowed(secs(500), secs(100), secs(100));
        assert_eq!(plan.len(), 1);
    }
}

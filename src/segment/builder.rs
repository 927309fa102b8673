//! Builds padded speech spans out of labeled intervals.
//!
//! Targets separated by short gaps are connected, every span gets a lead pad
//! carved out of the preceding gap and a trail pad out of the following one,
//! and anything still longer than the hard cap is split. Windows from the
//! segmenter are stitched back together by synthesizing a zero-length gap at
//! each window boundary, which lets speech cut by the boundary reconnect.

use crate::defaults;
use crate::segment::interval::{IntervalLabel, IntervalWindow};
use crate::segment::span::Span;
use std::path::PathBuf;

/// Which interval labels count as recognition targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetPolicy {
    /// Only intervals labeled speech.
    SpeechOnly,
    /// Everything except silence; noise often carries quiet speech.
    #[default]
    AllButSilence,
}

impl TargetPolicy {
    fn is_target(self, label: IntervalLabel) -> bool {
        match self {
            Self::SpeechOnly => label == IntervalLabel::Speech,
            Self::AllButSilence => label != IntervalLabel::Silence,
        }
    }
}

/// Tunables for span construction, all in milliseconds.
#[derive(Debug, Clone)]
pub struct SegmentBuilderConfig {
    pub policy: TargetPolicy,
    /// Lead pad: up to this much of the preceding gap is prepended.
    pub lead_pad_ms: u64,
    /// Gaps shorter than this connect adjacent targets into one span.
    pub connect_silence_ms: u64,
    /// Connection is skipped when the combined span would exceed this.
    pub connect_max_ms: u64,
    /// Trail pad: up to this much of the following gap is appended, once.
    pub trail_pad_ms: u64,
    /// Hard cap; longer spans are split at exact multiples of this.
    pub max_span_ms: u64,
}

impl Default for SegmentBuilderConfig {
    fn default() -> Self {
        Self {
            policy: TargetPolicy::default(),
            lead_pad_ms: defaults::LEAD_PAD_MS,
            connect_silence_ms: defaults::CONNECT_SILENCE_MS,
            connect_max_ms: defaults::CONNECT_MAX_MS,
            trail_pad_ms: defaults::TRAIL_PAD_MS,
            max_span_ms: defaults::MAX_SPAN_MS,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingSpan {
    start_ms: u64,
    end_ms: u64,
    org_start_ms: u64,
    org_end_ms: u64,
}

/// Streaming span builder. Feed windows in order, then call [`finish`].
///
/// [`finish`]: SegmentBuilder::finish
#[derive(Debug)]
pub struct SegmentBuilder {
    config: SegmentBuilderConfig,
    spans: Vec<PendingSpan>,
    /// Next target joins the previous span instead of opening a new one.
    connect: bool,
    /// The previous span already received its trail pad.
    prev_fixed: bool,
    /// Length of the gap immediately before the cursor.
    prev_silence_ms: u64,
    /// Length of the most recent span, for the connect-length check.
    prev_len_ms: u64,
}

impl SegmentBuilder {
    pub fn new(config: SegmentBuilderConfig) -> Self {
        Self {
            config,
            spans: Vec::new(),
            connect: false,
            prev_fixed: false,
            prev_silence_ms: 0,
            prev_len_ms: 0,
        }
    }

    /// Consumes one segmenter window. `window_ms` is the window length used
    /// to place the synthesized boundary gap.
    pub fn push_window(&mut self, window: &IntervalWindow, window_ms: u64) {
        let mut last_label = IntervalLabel::Silence;
        for interval in &window.intervals {
            if self.config.policy.is_target(interval.label) {
                self.push_target(interval.start_ms, interval.end_ms);
            } else {
                self.push_gap(interval.start_ms, interval.end_ms);
            }
            last_label = interval.label;
        }

        // A window ending mid-target would otherwise leave the next window's
        // opening target unconnectable.
        if self.config.policy.is_target(last_label) {
            let boundary = window_ms * (window.index as u64 + 1);
            self.push_gap(boundary, boundary);
        }
    }

    fn push_target(&mut self, start_ms: u64, end_ms: u64) {
        let (mut start, mut org_start) = if self.connect {
            match self.spans.pop() {
                Some(prev) => (prev.start_ms, prev.org_start_ms),
                None => (start_ms, start_ms),
            }
        } else {
            let lead = self.prev_silence_ms.min(self.config.lead_pad_ms);
            (start_ms.saturating_sub(lead), start_ms)
        };
        self.connect = false;
        self.prev_fixed = false;
        self.prev_len_ms = end_ms.saturating_sub(start);

        // Hard split: anything over the cap becomes exact-cap pieces plus a
        // remainder. Inclusive check, so an exact-cap tail is emitted once
        // rather than followed by a zero-length remainder.
        loop {
            if end_ms.saturating_sub(start) <= self.config.max_span_ms {
                self.spans.push(PendingSpan {
                    start_ms: start,
                    end_ms,
                    org_start_ms: org_start,
                    org_end_ms: end_ms,
                });
                break;
            }
            let cut = start + self.config.max_span_ms;
            self.spans.push(PendingSpan {
                start_ms: start,
                end_ms: cut,
                org_start_ms: org_start,
                org_end_ms: cut,
            });
            start = cut;
            org_start = cut;
        }
    }

    fn push_gap(&mut self, start_ms: u64, end_ms: u64) {
        let len = end_ms.saturating_sub(start_ms);
        self.prev_silence_ms = len;
        self.connect = false;

        if self.spans.is_empty() {
            return;
        }

        if len < self.config.connect_silence_ms
            && len + self.prev_len_ms < self.config.connect_max_ms
        {
            self.connect = true;
        } else if !self.prev_fixed {
            if let Some(last) = self.spans.last_mut() {
                last.end_ms += len.min(self.config.trail_pad_ms);
            }
            self.prev_fixed = true;
        }
    }

    /// Finalizes the spans, assigning 1-based ids and chunk paths.
    pub fn finish(self, chunk_path_for: impl Fn(u64) -> PathBuf) -> Vec<Span> {
        self.spans
            .into_iter()
            .enumerate()
            .map(|(i, pending)| {
                let id = i as u64 + 1;
                Span {
                    id,
                    chunk_path: chunk_path_for(id),
                    start_ms: pending.start_ms,
                    end_ms: pending.end_ms,
                    org_start_ms: pending.org_start_ms,
                    org_end_ms: pending.org_end_ms,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::interval::LabeledInterval;

    const WINDOW_MS: u64 = 600_000;

    fn window(index: usize, intervals: &[(IntervalLabel, u64, u64)]) -> IntervalWindow {
        IntervalWindow {
            index,
            intervals: intervals
                .iter()
                .map(|&(label, start_ms, end_ms)| LabeledInterval {
                    label,
                    start_ms,
                    end_ms,
                })
                .collect(),
        }
    }

    fn build(intervals: &[(IntervalLabel, u64, u64)]) -> Vec<Span> {
        let mut builder = SegmentBuilder::new(SegmentBuilderConfig::default());
        builder.push_window(&window(0, intervals), WINDOW_MS);
        builder.finish(|id| PathBuf::from(format!("a_{id}.flac")))
    }

    use IntervalLabel::{Noise, Silence, Speech};

    #[test]
    fn test_short_gap_connects_spans() {
        let spans = build(&[
            (Silence, 0, 1000),
            (Speech, 1000, 3000),
            (Silence, 3000, 3500),
            (Speech, 3500, 5000),
            (Silence, 5000, 20_000),
        ]);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_ms, 500); // lead pad of min(1000, 500)
        assert_eq!(spans[0].end_ms, 10_000); // trail pad of min(15000, 5000)
        assert_eq!(spans[0].org_start_ms, 1000);
        assert_eq!(spans[0].org_end_ms, 5000);
    }

    #[test]
    fn test_long_gap_separates_spans() {
        let spans = build(&[
            (Speech, 1000, 3000),
            (Silence, 3000, 9000),
            (Speech, 9000, 11_000),
            (Silence, 11_000, 30_000),
        ]);

        assert_eq!(spans.len(), 2);
        // 6s gap: trail pad of 5s on span 1, lead pad of 500ms on span 2.
        assert_eq!(spans[0].end_ms, 8000);
        assert_eq!(spans[1].start_ms, 8500);
        assert_eq!(spans[0].id, 1);
        assert_eq!(spans[1].id, 2);
    }

    #[test]
    fn test_connection_skipped_when_combined_too_long() {
        let spans = build(&[
            (Speech, 0, 4800),
            (Silence, 4800, 5100),
            (Speech, 5100, 7000),
            (Silence, 7000, 60_000),
        ]);

        // Gap is short (300ms) but combined length would be 5100ms.
        assert_eq!(spans.len(), 2);
        // Trail pad still applies, capped by the gap length.
        assert_eq!(spans[0].end_ms, 4800 + 300);
    }

    #[test]
    fn test_trail_pad_applied_once() {
        let spans = build(&[
            (Speech, 0, 2000),
            (Silence, 2000, 8000),
            (Noise, 8000, 8000),
            (Silence, 8000, 40_000),
        ]);

        // Zero-length noise is a target; it connects nothing and the silence
        // after it pads it, but the first span is padded exactly once.
        assert_eq!(spans[0].end_ms, 7000);
    }

    #[test]
    fn test_hard_split_at_cap() {
        let spans = build(&[(Speech, 0, 250_000), (Silence, 250_000, 300_000)]);

        assert_eq!(spans.len(), 3);
        assert_eq!((spans[0].start_ms, spans[0].end_ms), (0, 120_000));
        assert_eq!((spans[1].start_ms, spans[1].end_ms), (120_000, 240_000));
        assert_eq!(spans[2].start_ms, 240_000);
        // Remainder gets the trail pad.
        assert_eq!(spans[2].end_ms, 255_000);
        // Split pieces keep seamless original intervals.
        assert_eq!(spans[0].org_end_ms, 120_000);
        assert_eq!(spans[1].org_start_ms, 120_000);
    }

    #[test]
    fn test_span_of_exactly_the_cap_is_not_split() {
        let spans = build(&[(Speech, 0, 120_000), (Silence, 120_000, 200_000)]);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_ms, 0);
        // The trail pad lands on the real span, not a phantom remainder.
        assert_eq!(spans[0].end_ms, 125_000);
        assert_eq!(spans[0].org_end_ms, 120_000);
    }

    #[test]
    fn test_exact_multiple_of_cap_splits_without_remainder() {
        let spans = build(&[(Speech, 0, 240_000), (Silence, 240_000, 300_000)]);

        assert_eq!(spans.len(), 2);
        assert_eq!((spans[1].start_ms, spans[1].end_ms), (120_000, 245_000));
        assert!(spans.iter().all(|s| s.start_ms < s.end_ms));
    }

    #[test]
    fn test_speech_reconnects_across_window_boundary() {
        let mut builder = SegmentBuilder::new(SegmentBuilderConfig::default());
        builder.push_window(
            &window(0, &[(Silence, 0, 599_000), (Speech, 599_000, 600_000)]),
            WINDOW_MS,
        );
        builder.push_window(
            &window(1, &[(Speech, 600_000, 602_000), (Silence, 602_000, 650_000)]),
            WINDOW_MS,
        );
        let spans = builder.finish(|id| PathBuf::from(format!("a_{id}.flac")));

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].org_start_ms, 599_000);
        assert_eq!(spans[0].org_end_ms, 602_000);
    }

    #[test]
    fn test_speech_only_policy_skips_noise() {
        let mut builder = SegmentBuilder::new(SegmentBuilderConfig {
            policy: TargetPolicy::SpeechOnly,
            ..SegmentBuilderConfig::default()
        });
        builder.push_window(
            &window(0, &[(Noise, 0, 3000), (Silence, 3000, 20_000)]),
            WINDOW_MS,
        );
        let spans = builder.finish(|id| PathBuf::from(format!("a_{id}.flac")));

        assert!(spans.is_empty());
    }

    #[test]
    fn test_all_but_silence_policy_keeps_noise() {
        let spans = build(&[(Noise, 0, 3000), (Silence, 3000, 20_000)]);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_same_input_builds_identical_spans() {
        let intervals = [
            (Silence, 0, 800),
            (Speech, 800, 2400),
            (Silence, 2400, 2900),
            (Noise, 2900, 4100),
            (Silence, 4100, 30_000),
        ];
        assert_eq!(build(&intervals), build(&intervals));
    }

    #[test]
    fn test_track_opening_with_speech_gets_no_lead_pad() {
        let spans = build(&[(Speech, 0, 2000), (Silence, 2000, 20_000)]);
        assert_eq!(spans[0].start_ms, 0);
    }
}

//! Assigns timed recognizer segments to spans by maximum overlap.

use crate::engine::AsrSegment;
use crate::segment::Span;

#[derive(Debug)]
struct SpanSlot {
    start_ms: u64,
    end_ms: u64,
    text: String,
}

/// Forward-only realigner. Segments arrive in time order; each is appended
/// to the span it overlaps most, and the cursor never moves backwards, so a
/// segment can never land before text that was already placed.
#[derive(Debug)]
pub struct SpanRealigner {
    slots: Vec<SpanSlot>,
    cursor: usize,
}

impl SpanRealigner {
    pub fn new(spans: &[Span]) -> Self {
        Self::with_cursor(spans, 0)
    }

    /// Starts the cursor at `cursor`, for resuming after spans already
    /// written out.
    pub fn with_cursor(spans: &[Span], cursor: usize) -> Self {
        Self {
            slots: spans
                .iter()
                .map(|span| SpanSlot {
                    start_ms: span.start_ms,
                    end_ms: span.end_ms,
                    text: String::new(),
                })
                .collect(),
            cursor,
        }
    }

    /// Index of the span that last received text. Spans before it are final.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Accumulated text of one span, with trailing separator.
    pub fn text(&self, index: usize) -> &str {
        self.slots.get(index).map(|s| s.text.as_str()).unwrap_or("")
    }

    /// Places one segment. The candidate with the largest interval overlap
    /// wins; with no positive overlap anywhere the last span scanned takes
    /// the text, so nothing is ever dropped.
    pub fn assign(&mut self, segment: &AsrSegment) {
        if self.slots.is_empty() || self.cursor >= self.slots.len() {
            return;
        }

        let mut best_idx = self.cursor;
        let mut best_overlap = i64::MIN;
        let mut last_scanned = self.cursor;
        for i in self.cursor..self.slots.len() {
            let slot = &self.slots[i];
            last_scanned = i;
            let overlap = (segment.end_ms.min(slot.end_ms) as i64)
                - (segment.start_ms.max(slot.start_ms) as i64);
            if overlap > best_overlap {
                best_overlap = overlap;
                best_idx = i;
            } else if best_overlap > 0 {
                // Overlap is unimodal over consecutive spans.
                break;
            }
            if slot.start_ms >= segment.end_ms {
                break;
            }
        }
        if best_overlap <= 0 {
            best_idx = last_scanned;
        }

        let slot = &mut self.slots[best_idx];
        slot.text.push_str(&segment.text);
        slot.text.push(' ');
        self.cursor = best_idx;
    }

    /// All span texts, in span order.
    pub fn into_texts(self) -> Vec<String> {
        self.slots.into_iter().map(|s| s.text).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spans(intervals: &[(u64, u64)]) -> Vec<Span> {
        intervals
            .iter()
            .enumerate()
            .map(|(i, &(start_ms, end_ms))| Span {
                id: i as u64 + 1,
                chunk_path: PathBuf::from(format!("a_{}.flac", i + 1)),
                start_ms,
                end_ms,
                org_start_ms: start_ms,
                org_end_ms: end_ms,
            })
            .collect()
    }

    fn seg(start_ms: u64, end_ms: u64, text: &str) -> AsrSegment {
        AsrSegment {
            start_ms,
            end_ms,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_overlap_assignment() {
        let spans = spans(&[(0, 2000), (2000, 5000)]);
        let mut realigner = SpanRealigner::new(&spans);

        realigner.assign(&seg(100, 1900, "hello"));
        realigner.assign(&seg(2300, 4700, "world"));

        let texts = realigner.into_texts();
        assert_eq!(texts[0].trim(), "hello");
        assert_eq!(texts[1].trim(), "world");
    }

    #[test]
    fn test_straddling_segment_goes_to_larger_overlap() {
        let spans = spans(&[(0, 2000), (2000, 5000)]);
        let mut realigner = SpanRealigner::new(&spans);

        // 500ms in span 1, 1500ms in span 2.
        realigner.assign(&seg(1500, 3500, "straddle"));

        let texts = realigner.into_texts();
        assert_eq!(texts[0], "");
        assert_eq!(texts[1].trim(), "straddle");
    }

    #[test]
    fn test_gap_segment_joins_last_scanned_span() {
        let spans = spans(&[(0, 1000), (5000, 6000)]);
        let mut realigner = SpanRealigner::new(&spans);

        // Falls in the gap; the scan stops at the span past the segment and
        // that span takes the text rather than dropping it.
        realigner.assign(&seg(2000, 3000, "orphan"));

        let texts = realigner.into_texts();
        assert_eq!(texts[0], "");
        assert_eq!(texts[1].trim(), "orphan");
    }

    #[test]
    fn test_segment_past_every_span_joins_the_final_span() {
        let spans = spans(&[(0, 1000), (2000, 3000)]);
        let mut realigner = SpanRealigner::new(&spans);

        realigner.assign(&seg(8000, 9000, "tail"));

        assert_eq!(realigner.into_texts()[1].trim(), "tail");
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let spans = spans(&[(0, 2000), (2000, 4000), (4000, 6000)]);
        let mut realigner = SpanRealigner::new(&spans);

        realigner.assign(&seg(4100, 5900, "late"));
        assert_eq!(realigner.cursor(), 2);

        // An out-of-order early segment joins the cursor span instead of
        // rewinding.
        realigner.assign(&seg(0, 1000, "early"));
        assert_eq!(realigner.cursor(), 2);

        let texts = realigner.into_texts();
        assert_eq!(texts[0], "");
        assert_eq!(texts[2].trim(), "late early");
    }

    #[test]
    fn test_multiple_segments_accumulate_with_separator() {
        let spans = spans(&[(0, 10_000)]);
        let mut realigner = SpanRealigner::new(&spans);

        realigner.assign(&seg(0, 3000, "one"));
        realigner.assign(&seg(3000, 6000, "two"));
        realigner.assign(&seg(6000, 9000, "three"));

        assert_eq!(realigner.into_texts()[0], "one two three ");
    }

    #[test]
    fn test_resume_cursor_skips_finished_spans() {
        let spans = spans(&[(0, 2000), (2000, 4000)]);
        let mut realigner = SpanRealigner::with_cursor(&spans, 1);

        realigner.assign(&seg(100, 1900, "belongs to span one"));

        // Span 0 is already flushed; the text lands on the cursor span.
        let texts = realigner.into_texts();
        assert_eq!(texts[0], "");
        assert_eq!(texts[1].trim(), "belongs to span one");
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let spans_a = spans(&[(0, 2000), (2000, 5000), (6000, 9000)]);
        let segments = [
            seg(100, 1900, "a"),
            seg(1900, 2100, "b"),
            seg(2500, 4500, "c"),
            seg(6100, 8900, "d"),
        ];

        let run = || {
            let mut realigner = SpanRealigner::new(&spans_a);
            for segment in &segments {
                realigner.assign(segment);
            }
            realigner.into_texts()
        };

        assert_eq!(run(), run());
    }
}

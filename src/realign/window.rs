//! Adaptive window sizing for free-running recognizers.
//!
//! Some recognizers degenerate on long inputs: they emit the same text over
//! and over, each repeat covering an exact multiple of a fixed duration
//! unit. The controller halves the window when that happens and doubles it
//! again after clean windows, bounded by the engine's policy.

use crate::engine::{AsrSegment, WindowPolicy};

/// Current window length, adjusted between requests.
#[derive(Debug, Clone)]
pub struct WindowController {
    policy: WindowPolicy,
    current_ms: u64,
}

impl WindowController {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            current_ms: policy.initial_ms.clamp(policy.min_ms, policy.max_ms),
            policy,
        }
    }

    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    pub fn unit_ms(&self) -> u64 {
        self.policy.unit_ms
    }

    /// Halves the window after a degenerate response, down to the floor.
    pub fn shrink(&mut self) {
        self.current_ms = (self.current_ms / 2).max(self.policy.min_ms);
    }

    /// Doubles the window after a clean response, up to the ceiling.
    pub fn grow(&mut self) {
        self.current_ms = (self.current_ms * 2).min(self.policy.max_ms);
    }
}

/// Detects a degenerate repetition run: `min_repeats` or more consecutive
/// segments with identical trimmed text whose durations are all positive
/// exact multiples of `unit_ms`. Returns the index of the first segment of
/// the run, so everything before it can still be used.
pub fn degenerate_run_start(
    segments: &[AsrSegment],
    unit_ms: u64,
    min_repeats: usize,
) -> Option<usize> {
    if unit_ms == 0 || min_repeats == 0 {
        return None;
    }

    let qualifies = |segment: &AsrSegment| {
        let duration = segment.end_ms.saturating_sub(segment.start_ms);
        duration > 0 && duration % unit_ms == 0
    };

    let mut run_start = 0usize;
    let mut run_len = 0usize;
    for (i, segment) in segments.iter().enumerate() {
        let continues = run_len > 0
            && qualifies(segment)
            && segment.text.trim() == segments[run_start].text.trim();
        if continues {
            run_len += 1;
        } else if qualifies(segment) {
            run_start = i;
            run_len = 1;
        } else {
            run_len = 0;
        }
        if run_len >= min_repeats {
            return Some(run_start);
        }
    }
    None
}

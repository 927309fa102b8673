//! Labeled intervals from the external voice-activity segmenter.
//!
//! The VAD tool runs out-of-band and leaves one tab-separated file per
//! analysis window (`label<TAB>start_s<TAB>end_s`, one header line). Long
//! tracks produce several windows; times inside a window are relative to the
//! window, so the reader offsets them by `index × window_ms`.

use crate::error::{Result, TrackscribeError};
use crate::track::InputTrack;
use std::fs;

/// Classification of one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalLabel {
    Speech,
    Noise,
    Silence,
}

impl IntervalLabel {
    /// Parses a segmenter label. Unknown labels count as noise: recognized
    /// under the all-but-silence policy, never dropped as silence.
    pub fn parse(label: &str) -> Self {
        match label {
            "speech" => Self::Speech,
            "noEnergy" | "silence" => Self::Silence,
            _ => Self::Noise,
        }
    }
}

/// One labeled interval, absolute track time in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledInterval {
    pub label: IntervalLabel,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// All intervals of one analysis window, absolute times.
#[derive(Debug, Clone)]
pub struct IntervalWindow {
    pub index: usize,
    pub intervals: Vec<LabeledInterval>,
}

/// External silence-segmenter boundary.
pub trait VoiceSegmenter: Send + Sync {
    /// Labeled intervals for a track, one window at a time, in order.
    fn segment(&self, track: &InputTrack) -> Result<Vec<IntervalWindow>>;
}

/// Reads the per-window files the external VAD tool left in the track's
/// work directory.
#[derive(Debug, Clone)]
pub struct WindowFileSegmenter {
    window_ms: u64,
}

impl WindowFileSegmenter {
    pub fn new(window_ms: u64) -> Self {
        Self { window_ms }
    }
}

impl VoiceSegmenter for WindowFileSegmenter {
    fn segment(&self, track: &InputTrack) -> Result<Vec<IntervalWindow>> {
        let mut windows = Vec::new();
        let mut index = 0usize;
        loop {
            let path = track.window_file(index);
            if !path.is_file() {
                break;
            }
            let data = fs::read_to_string(&path)?;
            let offset_ms = self.window_ms * index as u64;
            let mut intervals = Vec::new();
            for (lineno, line) in data.lines().enumerate() {
                if lineno == 0 || line.trim().is_empty() {
                    // Header line
                    continue;
                }
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.len() < 3 {
                    return Err(TrackscribeError::SpanList {
                        message: format!(
                            "{}:{}: expected 3 tab-separated fields",
                            path.display(),
                            lineno + 1
                        ),
                    });
                }
                let start_s: f64 = fields[1].parse().map_err(|_| TrackscribeError::SpanList {
                    message: format!("{}:{}: bad start time", path.display(), lineno + 1),
                })?;
                let end_s: f64 = fields[2].parse().map_err(|_| TrackscribeError::SpanList {
                    message: format!("{}:{}: bad end time", path.display(), lineno + 1),
                })?;
                intervals.push(LabeledInterval {
                    label: IntervalLabel::parse(fields[0]),
                    start_ms: (start_s * 1000.0) as u64 + offset_ms,
                    end_ms: (end_s * 1000.0) as u64 + offset_ms,
                });
            }
            windows.push(IntervalWindow { index, intervals });
            index += 1;
        }

        if windows.is_empty() {
            return Err(TrackscribeError::SegmenterOutputMissing {
                path: track.window_file(0).display().to_string(),
            });
        }
        Ok(windows)
    }
}

/// Test segmenter returning canned windows.
#[derive(Debug, Clone, Default)]
pub struct MockSegmenter {
    windows: Vec<IntervalWindow>,
}

impl MockSegmenter {
    pub fn new(windows: Vec<IntervalWindow>) -> Self {
        Self { windows }
    }

    /// Single window built from `(label, start_ms, end_ms)` triples.
    pub fn single_window(intervals: Vec<(IntervalLabel, u64, u64)>) -> Self {
        Self {
            windows: vec![IntervalWindow {
                index: 0,
                intervals: intervals
                    .into_iter()
                    .map(|(label, start_ms, end_ms)| LabeledInterval {
                        label,
                        start_ms,
                        end_ms,
                    })
                    .collect(),
            }],
        }
    }
}

impl VoiceSegmenter for MockSegmenter {
    fn segment(&self, _track: &InputTrack) -> Result<Vec<IntervalWindow>> {
        Ok(self.windows.clone())
    }
}

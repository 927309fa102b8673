//! Voice-activity intervals, span construction, and the span-list file.

pub mod builder;
pub mod interval;
pub mod span;

pub use builder::{SegmentBuilder, SegmentBuilderConfig, TargetPolicy};
pub use interval::{
    IntervalLabel, IntervalWindow, LabeledInterval, MockSegmenter, VoiceSegmenter,
    WindowFileSegmenter,
};
pub use span::{Span, read_span_list, write_span_list};

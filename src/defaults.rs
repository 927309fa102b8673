//! Default values and named constants.

/// Length of one upstream VAD analysis window in milliseconds. Long tracks
/// are segmented in windows of this size; window boundaries are soft.
pub const SEG_WINDOW_MS: u64 = 600_000;

/// Lead pad: a span starts up to this much earlier than the detected voice
/// onset, bounded by the preceding silence.
pub const LEAD_PAD_MS: u64 = 500;

/// A silence gap shorter than this connects the surrounding speech spans
/// (breath pauses should not cut a sentence).
pub const CONNECT_SILENCE_MS: u64 = 1_000;

/// A connect is only taken while the combined span stays under this length.
pub const CONNECT_MAX_MS: u64 = 5_000;

/// Trailing pad added once when a span is finalized by a long silence.
pub const TRAIL_PAD_MS: u64 = 5_000;

/// Hard maximum span duration; longer spans are split into fixed-length
/// sub-spans to keep recognizer input bounded.
pub const MAX_SPAN_MS: u64 = 120_000;

/// Poll interval for stage worker loops.
pub const POLL_INTERVAL_MS: u64 = 1_000;

/// Transient engine errors are retried this many times before escalating.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay between retry attempts.
pub const RETRY_BACKOFF_MS: u64 = 1_000;

/// Initial window length for engines fed bounded audio windows.
pub const WINDOW_INITIAL_MS: u64 = 60_000;

/// Floor for the adaptive window length.
pub const WINDOW_MIN_MS: u64 = 5_000;

/// Ceiling for the adaptive window length.
pub const WINDOW_MAX_MS: u64 = 240_000;

/// Degenerate output repeats at exact multiples of this unit.
pub const DEGENERACY_UNIT_MS: u64 = 1_000;

/// Minimum consecutive repeats that count as a degeneracy signature.
pub const DEGENERACY_MIN_REPEATS: usize = 2;

/// File name of the merged timeline written next to the inputs.
pub const MERGED_CSV_NAME: &str = "merged.csv";

//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Multi-track recording transcription
#[derive(Parser, Debug)]
#[command(
    name = "trackscribe",
    version,
    about = "Transcribes multi-track recordings into a merged timeline"
)]
pub struct Cli {
    /// Input tracks, one audio file per speaker
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Merged CSV output path (default: merged.csv next to the first input)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Idle worker poll interval. Examples: 500ms, 1s, 2s
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Delete chunk files after each track's clips are rendered
    #[arg(long)]
    pub cleanup_chunks: bool,

    /// Suppress output (quiet mode)
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose output (-v: stage progress, -vv: per-span detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration string. Bare numbers are milliseconds; anything else
/// goes through `humantime` (`500ms`, `2s`, `1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

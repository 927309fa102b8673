//! External media toolchain boundary.
//!
//! Chunk rendering and clip conversion go through ffmpeg; format probing
//! through ffprobe. The trait exists so the pipeline can be exercised with a
//! mock toolchain in tests.

use crate::error::{Result, TrackscribeError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

/// One stream reported by the prober.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: String,
}

/// A single cut-and-encode request: render `[start, start+duration)` of the
/// input to `output`, codec chosen by the output extension.
#[derive(Debug, Clone)]
pub struct TranscodeSpec {
    pub start_ms: u64,
    pub duration_ms: u64,
    pub output: PathBuf,
}

/// External media toolchain.
pub trait MediaToolchain: Send + Sync {
    /// Lists the streams of a media file.
    fn probe_streams(&self, path: &Path) -> Result<Vec<StreamInfo>>;

    /// Renders one interval of the input into `spec.output`.
    fn transcode(&self, input: &Path, spec: &TranscodeSpec) -> Result<()>;
}

/// Production toolchain shelling out to ffmpeg/ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegToolchain {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfmpegToolchain {
    /// Override the executable names (e.g. absolute paths).
    pub fn with_binaries(ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffprobe.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

/// Formats milliseconds as ffmpeg-friendly fractional seconds.
fn seconds_arg(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

impl MediaToolchain for FfmpegToolchain {
    fn probe_streams(&self, path: &Path) -> Result<Vec<StreamInfo>> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_streams", "-of", "json"])
            .arg(path)
            .output()
            .map_err(|e| TrackscribeError::Media {
                message: format!("failed to run {}: {e}", self.ffprobe),
            })?;

        if !output.status.success() {
            return Err(TrackscribeError::Media {
                message: format!(
                    "{} failed for {}: {}",
                    self.ffprobe,
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let probe: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| TrackscribeError::Media {
                message: format!("unparseable {} output: {e}", self.ffprobe),
            })?;
        Ok(probe.streams)
    }

    fn transcode(&self, input: &Path, spec: &TranscodeSpec) -> Result<()> {
        // -ss before -i seeks on the demuxer, which is what keeps cutting
        // thousands of chunks out of a multi-hour file fast.
        let output = Command::new(&self.ffmpeg)
            .arg("-ss")
            .arg(seconds_arg(spec.start_ms))
            .arg("-t")
            .arg(seconds_arg(spec.duration_ms))
            .arg("-i")
            .arg(input)
            .args(["-vn", "-y"])
            .arg(&spec.output)
            .output()
            .map_err(|e| TrackscribeError::Media {
                message: format!("failed to run {}: {e}", self.ffmpeg),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(TrackscribeError::Media {
                message: format!(
                    "{} failed rendering {}: {tail}",
                    self.ffmpeg,
                    spec.output.display()
                ),
            });
        }
        Ok(())
    }
}

/// Test toolchain: records calls and writes placeholder output files.
#[derive(Debug, Default)]
pub struct MockToolchain {
    calls: Mutex<Vec<(PathBuf, TranscodeSpec)>>,
    fail: bool,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every transcode call fail.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// All transcode calls made so far, in order.
    pub fn calls(&self) -> Vec<(PathBuf, TranscodeSpec)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl MediaToolchain for MockToolchain {
    fn probe_streams(&self, _path: &Path) -> Result<Vec<StreamInfo>> {
        Ok(vec![StreamInfo {
            codec_type: "audio".to_string(),
            codec_name: "pcm_s16le".to_string(),
        }])
    }

    fn transcode(&self, input: &Path, spec: &TranscodeSpec) -> Result<()> {
        if self.fail {
            return Err(TrackscribeError::Media {
                message: "mock transcode failure".to_string(),
            });
        }
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((input.to_path_buf(), spec.clone()));
        std::fs::write(
            &spec.output,
            format!("{}..{}", spec.start_ms, spec.start_ms + spec.duration_ms),
        )?;
        Ok(())
    }
}

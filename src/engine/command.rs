//! Engine adapter shelling out to an external recognizer command.
//!
//! The command is invoked once per request with `--chunk <file>` or
//! `--window <track> <start_ms> <len_ms>` appended and must print a JSON
//! object on stdout:
//!
//! ```json
//! {"text": "...", "candidates": ["..."], "confidence": 85,
//!  "segments": [{"start_ms": 0, "end_ms": 1200, "text": "..."}]}
//! ```
//!
//! All fields except `text` are optional. Segment times are relative to the
//! audio handed to the command; window responses are shifted back to track
//! time here.

use crate::engine::{
    AsrSegment, AudioRequest, EngineError, EngineOutput, EngineResult, RecognitionEngine,
    WindowPolicy,
};
use serde::Deserialize;
use std::io::ErrorKind;
use std::process::Command;

/// Recognition engine backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    name: String,
    tag: char,
    fingerprint: String,
    command: Vec<String>,
    window_policy: Option<WindowPolicy>,
}

impl CommandEngine {
    /// `command` is the program plus fixed leading arguments.
    pub fn new(name: &str, tag: char, fingerprint: &str, command: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            tag,
            fingerprint: fingerprint.to_string(),
            command,
            window_policy: None,
        }
    }

    /// Switches the engine to sliding-window requests.
    pub fn with_window_policy(mut self, policy: WindowPolicy) -> Self {
        self.window_policy = Some(policy);
        self
    }
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    candidates: Vec<String>,
    #[serde(default)]
    confidence: u8,
    #[serde(default)]
    segments: Vec<AsrSegment>,
}

impl RecognitionEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> char {
        self.tag
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn window_policy(&self) -> Option<WindowPolicy> {
        self.window_policy
    }

    fn recognize(&self, request: &AudioRequest<'_>) -> EngineResult<EngineOutput> {
        let (program, fixed_args) = self.command.split_first().ok_or_else(|| {
            EngineError::Config {
                remedy: format!("configure a command for engine {}", self.name),
            }
        })?;

        let mut cmd = Command::new(program);
        cmd.args(fixed_args);
        let window_start = match request {
            AudioRequest::Chunk(path) => {
                cmd.arg("--chunk").arg(path);
                None
            }
            AudioRequest::Window {
                track,
                start_ms,
                len_ms,
            } => {
                cmd.arg("--window")
                    .arg(track)
                    .arg(start_ms.to_string())
                    .arg(len_ms.to_string());
                Some(*start_ms)
            }
        };

        let output = cmd.output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                EngineError::Config {
                    remedy: format!("install {program} or fix the engine command path"),
                }
            } else {
                EngineError::Transient(format!("failed to run {program}: {e}"))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr.lines().last().unwrap_or("").to_string();
            return Err(EngineError::Fatal(format!(
                "{program} exited with {}: {tail}",
                output.status
            )));
        }

        let response: CommandResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::Fatal(format!("unparseable {program} output: {e}")))?;

        let candidates = if response.candidates.is_empty() && !response.text.is_empty() {
            vec![response.text]
        } else {
            response.candidates
        };
        let mut segments = response.segments;
        if let Some(offset) = window_start {
            for segment in &mut segments {
                segment.start_ms += offset;
                segment.end_ms += offset;
            }
        }

        Ok(EngineOutput {
            candidates,
            confidence: response.confidence,
            segments,
        })
    }
}

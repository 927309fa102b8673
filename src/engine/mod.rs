//! Recognition engine boundary.
//!
//! Engines are adapters around external speech recognizers. A chunk engine
//! consumes the pre-cut chunk files; a windowed engine (one that reports a
//! [`WindowPolicy`]) is fed arbitrary intervals of the original track and is
//! driven by the realignment loop instead of the per-chunk runner.

pub mod command;
pub mod result_file;
pub mod retry;
pub mod runner;

pub use command::CommandEngine;
pub use result_file::RecognitionRow;
pub use runner::EngineRunner;

use std::path::Path;
use std::sync::Mutex;

/// One timed segment of recognized text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct AsrSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Everything an engine returns for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// Transcription candidates, best first. May be empty for pure silence.
    pub candidates: Vec<String>,
    /// Engine confidence in percent, 0 when the engine reports none.
    pub confidence: u8,
    /// Timed segments, offsets absolute to the request's audio origin.
    pub segments: Vec<AsrSegment>,
}

/// Audio handed to an engine.
#[derive(Debug, Clone, Copy)]
pub enum AudioRequest<'a> {
    /// A pre-cut chunk file.
    Chunk(&'a Path),
    /// An interval of the original track, for windowed engines.
    Window {
        track: &'a Path,
        start_ms: u64,
        len_ms: u64,
    },
}

/// Engine failures, separated by how the caller should react.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Misconfiguration (missing binary, bad credentials). Not retryable;
    /// `remedy` tells the operator what to fix.
    #[error("engine misconfigured: {remedy}")]
    Config { remedy: String },
    /// Transient failure (network, rate limit). Retried with backoff.
    #[error("{0}")]
    Transient(String),
    /// Permanent failure for this request.
    #[error("{0}")]
    Fatal(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Window sizing for engines recognized via sliding windows.
#[derive(Debug, Clone, Copy)]
pub struct WindowPolicy {
    pub initial_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    /// Degenerate outputs come in durations that are exact multiples of
    /// this unit.
    pub unit_ms: u64,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            initial_ms: crate::defaults::WINDOW_INITIAL_MS,
            min_ms: crate::defaults::WINDOW_MIN_MS,
            max_ms: crate::defaults::WINDOW_MAX_MS,
            unit_ms: crate::defaults::DEGENERACY_UNIT_MS,
        }
    }
}

/// A speech recognition engine.
pub trait RecognitionEngine: Send + Sync {
    /// Stable engine name, used for stage keys and result file names.
    fn name(&self) -> &str;

    /// Single-character tag marking this engine's rows in the merged output.
    fn tag(&self) -> char;

    /// Identifies the model/configuration variant. Completed work recorded
    /// under a different fingerprint is redone.
    fn fingerprint(&self) -> String;

    /// `Some` when the engine wants sliding-window requests instead of
    /// chunk files.
    fn window_policy(&self) -> Option<WindowPolicy> {
        None
    }

    fn recognize(&self, request: &AudioRequest<'_>) -> EngineResult<EngineOutput>;
}

/// Scripted engine for tests.
pub struct MockEngine {
    name: String,
    tag: char,
    fingerprint: String,
    window_policy: Option<WindowPolicy>,
    default_text: Option<String>,
    chunk_responses: Vec<(String, EngineOutput)>,
    window_script: Mutex<Vec<EngineOutput>>,
    transient_failures: Mutex<u32>,
    config_error: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new(name: &str, tag: char) -> Self {
        Self {
            name: name.to_string(),
            tag,
            fingerprint: "mock-v1".to_string(),
            window_policy: None,
            default_text: None,
            chunk_responses: Vec::new(),
            window_script: Mutex::new(Vec::new()),
            transient_failures: Mutex::new(0),
            config_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fixed single-candidate response for any chunk.
    pub fn with_text(mut self, text: &str) -> Self {
        self.default_text = Some(text.to_string());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = fingerprint.to_string();
        self
    }

    /// Response for a specific chunk file name.
    pub fn with_chunk_response(mut self, chunk_name: &str, output: EngineOutput) -> Self {
        self.chunk_responses.push((chunk_name.to_string(), output));
        self
    }

    /// Makes the engine windowed; window requests consume the script in
    /// order.
    pub fn with_window_script(mut self, policy: WindowPolicy, script: Vec<EngineOutput>) -> Self {
        self.window_policy = Some(policy);
        self.window_script = Mutex::new(script);
        self
    }

    /// First `n` calls fail with a transient error.
    pub fn with_transient_failures(mut self, n: u32) -> Self {
        self.transient_failures = Mutex::new(n);
        self
    }

    /// Every call fails with a configuration error.
    pub fn with_config_error(mut self, remedy: &str) -> Self {
        self.config_error = Some(remedy.to_string());
        self
    }

    /// Request descriptions, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RecognitionEngine for MockEngine {
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
        let description = match request {
            AudioRequest::Chunk(path) => path.display().to_string(),
            AudioRequest::Window { start_ms, len_ms, .. } => {
                format!("window {start_ms}+{len_ms}")
            }
        };
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(description);

        if let Some(remedy) = &self.config_error {
            return Err(EngineError::Config {
                remedy: remedy.clone(),
            });
        }
        {
            let mut failures = self
                .transient_failures
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *failures > 0 {
                *failures -= 1;
                return Err(EngineError::Transient("mock transient failure".to_string()));
            }
        }

        match request {
            AudioRequest::Chunk(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some((_, output)) =
                    self.chunk_responses.iter().find(|(n, _)| *n == name)
                {
                    return Ok(output.clone());
                }
                let text = self
                    .default_text
                    .clone()
                    .unwrap_or_else(|| format!("transcript of {name}"));
                Ok(EngineOutput {
                    candidates: vec![text],
                    confidence: 90,
                    segments: Vec::new(),
                })
            }
            AudioRequest::Window { .. } => {
                let mut script = self
                    .window_script
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                if script.is_empty() {
                    Ok(EngineOutput::default())
                } else {
                    Ok(script.remove(0))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_default_text() {
        let engine = MockEngine::new("test", 'T').with_text("hello");
        let output = engine
            .recognize(&AudioRequest::Chunk(Path::new("a_1.flac")))
            .unwrap();
        assert_eq!(output.candidates, vec!["hello".to_string()]);
        assert_eq!(engine.calls(), vec!["a_1.flac".to_string()]);
    }

    #[test]
    fn test_mock_transient_failures_run_out() {
        let engine = MockEngine::new("test", 'T')
            .with_text("ok")
            .with_transient_failures(2);
        let request = AudioRequest::Chunk(Path::new("a_1.flac"));

        assert!(matches!(
            engine.recognize(&request),
            Err(EngineError::Transient(_))
        ));
        assert!(matches!(
            engine.recognize(&request),
            Err(EngineError::Transient(_))
        ));
        assert!(engine.recognize(&request).is_ok());
    }

    #[test]
    fn test_mock_window_script_consumed_in_order() {
        let first = EngineOutput {
            candidates: vec!["one".to_string()],
            confidence: 50,
            segments: Vec::new(),
        };
        let engine = MockEngine::new("test", 'T')
            .with_window_script(WindowPolicy::default(), vec![first.clone()]);
        let request = AudioRequest::Window {
            track: Path::new("a.wav"),
            start_ms: 0,
            len_ms: 60_000,
        };

        assert_eq!(engine.recognize(&request).unwrap(), first);
        assert_eq!(engine.recognize(&request).unwrap(), EngineOutput::default());
    }
}

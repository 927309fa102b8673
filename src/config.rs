//! TOML configuration with environment overrides.
//!
//! Everything has a default; an absent config file means a pipeline with no
//! engines, which still segments, chunks, and converts. Engine entries wire
//! up [`CommandEngine`]s.
//!
//! ```toml
//! [segmenter]
//! window_ms = 600000
//! policy = "all_but_silence"
//!
//! [[engine]]
//! name = "whisper"
//! tag = "W"
//! fingerprint = "large-v3"
//! command = ["whisper-recognize", "--model", "large-v3"]
//!
//! [[engine]]
//! name = "wit"
//! tag = "I"
//! fingerprint = "wit-2024"
//! command = ["wit-recognize"]
//! windowed = true
//! ```

use crate::defaults;
use crate::engine::{CommandEngine, RecognitionEngine, WindowPolicy};
use crate::error::{Result, TrackscribeError};
use crate::pipeline::SchedulerConfig;
use crate::segment::{SegmentBuilderConfig, TargetPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmenterSection {
    /// Analysis window length the external segmenter was run with.
    pub window_ms: u64,
    /// "all_but_silence" or "speech_only".
    pub policy: String,
    pub lead_pad_ms: u64,
    pub connect_silence_ms: u64,
    pub connect_max_ms: u64,
    pub trail_pad_ms: u64,
    pub max_span_ms: u64,
}

impl Default for SegmenterSection {
    fn default() -> Self {
        Self {
            window_ms: defaults::SEG_WINDOW_MS,
            policy: "all_but_silence".to_string(),
            lead_pad_ms: defaults::LEAD_PAD_MS,
            connect_silence_ms: defaults::CONNECT_SILENCE_MS,
            connect_max_ms: defaults::CONNECT_MAX_MS,
            trail_pad_ms: defaults::TRAIL_PAD_MS,
            max_span_ms: defaults::MAX_SPAN_MS,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub poll_interval_ms: u64,
    pub cleanup_chunks: bool,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            cleanup_chunks: false,
            retry_attempts: defaults::RETRY_ATTEMPTS,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
    pub initial_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub unit_ms: u64,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            initial_ms: defaults::WINDOW_INITIAL_MS,
            min_ms: defaults::WINDOW_MIN_MS,
            max_ms: defaults::WINDOW_MAX_MS,
            unit_ms: defaults::DEGENERACY_UNIT_MS,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    pub name: String,
    /// Single character marking this engine's rows in the merged output.
    pub tag: String,
    #[serde(default)]
    pub fingerprint: String,
    pub command: Vec<String>,
    /// Feed the engine sliding windows of the raw track instead of chunks.
    #[serde(default)]
    pub windowed: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub segmenter: SegmenterSection,
    pub pipeline: PipelineSection,
    pub window: WindowSection,
    #[serde(rename = "engine")]
    pub engines: Vec<EngineSection>,
}

impl Config {
    /// Loads a config file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(TrackscribeError::ConfigFileNotFound {
                path: path.display().to_string(),
            });
        }
        let data = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&data)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads `path` when given, otherwise the default location when it
    /// exists, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load(&path),
                _ => {
                    let mut config = Self::default();
                    config.apply_env_overrides();
                    Ok(config)
                }
            },
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("trackscribe").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("TRACKSCRIBE_POLL_INTERVAL_MS") {
            self.pipeline.poll_interval_ms = v;
        }
        if let Ok(v) = std::env::var("TRACKSCRIBE_CLEANUP_CHUNKS") {
            self.pipeline.cleanup_chunks = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = env_u64("TRACKSCRIBE_RETRY_ATTEMPTS") {
            self.pipeline.retry_attempts = v as u32;
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.segmenter.policy.as_str() {
            "all_but_silence" | "speech_only" => {}
            other => {
                return Err(TrackscribeError::ConfigInvalidValue {
                    key: "segmenter.policy".to_string(),
                    message: format!(
                        "{other:?} is not one of \"all_but_silence\", \"speech_only\""
                    ),
                });
            }
        }
        if self.window.min_ms == 0 || self.window.min_ms > self.window.max_ms {
            return Err(TrackscribeError::ConfigInvalidValue {
                key: "window.min_ms".to_string(),
                message: "must be positive and no larger than window.max_ms".to_string(),
            });
        }
        if self.window.unit_ms == 0 {
            return Err(TrackscribeError::ConfigInvalidValue {
                key: "window.unit_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for engine in &self.engines {
            if engine.tag.chars().count() != 1 {
                return Err(TrackscribeError::ConfigInvalidValue {
                    key: format!("engine.{}.tag", engine.name),
                    message: "must be exactly one character".to_string(),
                });
            }
            if engine.enabled && engine.command.is_empty() {
                return Err(TrackscribeError::ConfigInvalidValue {
                    key: format!("engine.{}.command", engine.name),
                    message: "must not be empty".to_string(),
                });
            }
            if !seen.insert(engine.name.clone()) {
                return Err(TrackscribeError::ConfigInvalidValue {
                    key: "engine.name".to_string(),
                    message: format!("duplicate engine {:?}", engine.name),
                });
            }
        }
        Ok(())
    }

    pub fn builder_config(&self) -> SegmentBuilderConfig {
        SegmentBuilderConfig {
            policy: if self.segmenter.policy == "speech_only" {
                TargetPolicy::SpeechOnly
            } else {
                TargetPolicy::AllButSilence
            },
            lead_pad_ms: self.segmenter.lead_pad_ms,
            connect_silence_ms: self.segmenter.connect_silence_ms,
            connect_max_ms: self.segmenter.connect_max_ms,
            trail_pad_ms: self.segmenter.trail_pad_ms,
            max_span_ms: self.segmenter.max_span_ms,
        }
    }

    pub fn window_policy(&self) -> WindowPolicy {
        WindowPolicy {
            initial_ms: self.window.initial_ms,
            min_ms: self.window.min_ms,
            max_ms: self.window.max_ms,
            unit_ms: self.window.unit_ms,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(self.pipeline.poll_interval_ms),
            cleanup_chunks: self.pipeline.cleanup_chunks,
            retry_attempts: self.pipeline.retry_attempts,
            retry_backoff: Duration::from_millis(self.pipeline.retry_backoff_ms),
            segmenter_window_ms: self.segmenter.window_ms,
            builder: self.builder_config(),
        }
    }

    /// Instantiates the enabled engines.
    pub fn build_engines(&self) -> Vec<Arc<dyn RecognitionEngine>> {
        self.engines
            .iter()
            .filter(|e| e.enabled)
            .map(|e| {
                let tag = e.tag.chars().next().unwrap_or('?');
                let mut engine =
                    CommandEngine::new(&e.name, tag, &e.fingerprint, e.command.clone());
                if e.windowed {
                    engine = engine.with_window_policy(self.window_policy());
                }
                Arc::new(engine) as Arc<dyn RecognitionEngine>
            })
            .collect()
    }

    /// `(name, tag)` pairs of the enabled engines, in config order.
    pub fn engine_tags(&self) -> Vec<(String, char)> {
        self.engines
            .iter()
            .filter(|e| e.enabled)
            .map(|e| (e.name.clone(), e.tag.chars().next().unwrap_or('?')))
            .collect()
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

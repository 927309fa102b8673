//! Error types for trackscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackscribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Track / workspace errors
    #[error("Input track not found: {path}")]
    TrackNotFound { path: String },

    #[error("Segmenter output not found: {path}")]
    SegmenterOutputMissing { path: String },

    #[error("Malformed span list: {message}")]
    SpanList { message: String },

    // Checkpoint errors
    #[error("Checkpoint write failed: {message}")]
    Checkpoint { message: String },

    // Media toolchain errors
    #[error("Media toolchain failed: {message}")]
    Media { message: String },

    // Recognition errors
    #[error("Engine {engine} misconfigured: {remedy}")]
    EngineConfig { engine: String, remedy: String },

    #[error("Engine {engine} failed: {message}")]
    Engine { engine: String, message: String },

    #[error("Resume marker for {track}/{stage} never reached; rerun to restart the stage")]
    ResumeFailed { track: String, stage: String },

    // Aggregate pipeline failure (one per run, names the failing track and stage)
    #[error("Pipeline failed in stage {stage} for track {track}: {message}")]
    StageFailed {
        track: String,
        stage: String,
        message: String,
    },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Result file error: {0}")]
    Csv(#[from] csv::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, TrackscribeError>;

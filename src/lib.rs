//! Resumable transcription pipeline for multi-track recordings.
//!
//! Each input file is one speaker's track. Tracks move through a fixed
//! stage sequence — segmentation, chunking, recognition by any number of
//! engines in parallel, clip conversion — with every completed unit of work
//! checkpointed, so an interrupted run picks up where it stopped. Engine
//! results are merged into a single time-ordered timeline at the end.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod checkpoint;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod media;
pub mod merge;
pub mod pipeline;
pub mod realign;
pub mod segment;
pub mod track;

pub use config::Config;
pub use error::{Result, TrackscribeError};
pub use track::InputTrack;

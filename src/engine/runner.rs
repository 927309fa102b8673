//! Per-chunk recognition loop with crash resume.

use crate::checkpoint::{CheckpointStore, recognize_stage};
use crate::engine::result_file::{RecognitionRow, append_row};
use crate::engine::retry::with_retry;
use crate::engine::{AudioRequest, EngineError, RecognitionEngine};
use crate::error::{Result, TrackscribeError};
use crate::pipeline::cancel::CancelToken;
use crate::segment::Span;
use crate::track::InputTrack;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

/// Runs one chunk engine over a track's spans, appending to the engine's
/// result file and checkpointing after every span.
pub struct EngineRunner {
    engine: Arc<dyn RecognitionEngine>,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl EngineRunner {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        retry_attempts: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            engine,
            retry_attempts,
            retry_backoff,
        }
    }

    /// Recognizes every span not yet covered by the checkpoint. The progress
    /// marker is the clip file name of the last recognized span; on resume
    /// the loop skips forward to just past it. Returns without marking the
    /// stage done when cancelled mid-track.
    pub fn run(
        &self,
        track: &InputTrack,
        spans: &[Span],
        store: &CheckpointStore,
        cancel: &CancelToken,
    ) -> Result<()> {
        let name = self.engine.name().to_string();
        let stage = recognize_stage(&name);
        let fingerprint = self.engine.fingerprint();

        if store.is_stage_done(track, &stage, &fingerprint) {
            log::debug!("{}: {stage} already done, skipping", track.speaker);
            return Ok(());
        }

        let result_path = track.result_file(&name);
        let status = store.read(track).stage(&stage);
        if !status.fingerprint.is_empty() && status.fingerprint != fingerprint {
            log::info!(
                "{}: {name} fingerprint changed ({} -> {fingerprint}), redoing",
                track.speaker,
                status.fingerprint
            );
            store.update(track, |cp| {
                cp.stages.remove(&stage);
            })?;
            if result_path.is_file() {
                fs::remove_file(&result_path)?;
            }
        }

        let marker = store.read(track).stage(&stage).progress;
        let mut skipping = !marker.is_empty();
        if !skipping && result_path.is_file() {
            // Fresh start: whatever is in the file belongs to an
            // invalidated run.
            fs::remove_file(&result_path)?;
        }

        for span in spans {
            let clip_name = track
                .clip_file(span.id)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if skipping {
                if clip_name == marker {
                    skipping = false;
                }
                continue;
            }
            if cancel.is_cancelled() {
                return Ok(());
            }
            if !span.chunk_path.is_file() {
                log::debug!(
                    "{}: chunk {} missing, skipping span {}",
                    track.speaker,
                    span.chunk_path.display(),
                    span.id
                );
                continue;
            }

            let request = AudioRequest::Chunk(&span.chunk_path);
            let output = with_retry(self.retry_attempts, self.retry_backoff, || {
                self.engine.recognize(&request)
            })
            .map_err(|e| match e {
                EngineError::Config { remedy } => TrackscribeError::EngineConfig {
                    engine: name.clone(),
                    remedy,
                },
                other => TrackscribeError::Engine {
                    engine: name.clone(),
                    message: other.to_string(),
                },
            })?;

            append_row(
                &result_path,
                &RecognitionRow {
                    speaker: track.speaker.clone(),
                    clip: clip_name.clone(),
                    start_ms: span.org_start_ms,
                    duration_ms: span.org_end_ms.saturating_sub(span.org_start_ms),
                    confidence: output.confidence,
                    candidates: output.candidates,
                },
            )?;
            store.set_progress(track, &stage, &clip_name, &fingerprint)?;
        }

        if skipping {
            // The recorded marker matched no span: span ids were rebuilt
            // since the last run, so the partial results are unusable.
            store.clear_progress(track, &stage)?;
            return Err(TrackscribeError::ResumeFailed {
                track: track.speaker.clone(),
                stage,
            });
        }
        if !cancel.is_cancelled() {
            store.mark_done(track, &stage, &fingerprint)?;
        }
        Ok(())
    }
}

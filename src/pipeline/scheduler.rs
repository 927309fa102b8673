//! Runs all stages of all tracks concurrently.
//!
//! One prep worker walks the tracks through segmentation and chunking, then
//! hands each track to every engine worker through a private queue. Engine
//! workers recognize independently; a convert worker renders the playable
//! clips once every engine has finished a track. Workers poll their queues
//! so they can notice cancellation between units of work; the first failure
//! anywhere trips the shared cancel token and wins the run's error slot.

use crate::checkpoint::{CheckpointStore, STAGE_CHUNK, STAGE_CONVERT, STAGE_SEGMENT};
use crate::chunk::ChunkMaterializer;
use crate::defaults;
use crate::engine::runner::EngineRunner;
use crate::engine::RecognitionEngine;
use crate::error::{Result, TrackscribeError};
use crate::media::MediaToolchain;
use crate::pipeline::cancel::CancelToken;
use crate::realign::WindowedRecognizer;
use crate::segment::{
    SegmentBuilder, SegmentBuilderConfig, Span, VoiceSegmenter, read_span_list, write_span_list,
};
use crate::track::InputTrack;
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Scheduler tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long idle workers sleep between queue polls.
    pub poll_interval: Duration,
    /// Delete chunk files once a track's clips are rendered.
    pub cleanup_chunks: bool,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    /// Analysis window length the external segmenter was run with.
    pub segmenter_window_ms: u64,
    pub builder: SegmentBuilderConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            cleanup_chunks: false,
            retry_attempts: defaults::RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
            segmenter_window_ms: defaults::SEG_WINDOW_MS,
            builder: SegmentBuilderConfig::default(),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Span count per speaker, in input order.
    pub spans_per_track: Vec<(String, usize)>,
}

type Failure = (String, String, String);

/// Runs the whole pipeline over a set of tracks.
pub struct Scheduler {
    config: SchedulerConfig,
    segmenter: Arc<dyn VoiceSegmenter>,
    toolchain: Arc<dyn MediaToolchain>,
    engines: Vec<Arc<dyn RecognitionEngine>>,
    checkpoints: Arc<CheckpointStore>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        segmenter: Arc<dyn VoiceSegmenter>,
        toolchain: Arc<dyn MediaToolchain>,
        engines: Vec<Arc<dyn RecognitionEngine>>,
    ) -> Self {
        Self {
            config,
            segmenter,
            toolchain,
            engines,
            checkpoints: Arc::new(CheckpointStore::new()),
        }
    }

    pub fn checkpoints(&self) -> Arc<CheckpointStore> {
        self.checkpoints.clone()
    }

    /// Processes every track through all stages. Fail-fast: the first stage
    /// error cancels all workers and is returned once they have drained.
    pub fn run(&self, tracks: &[InputTrack]) -> Result<PipelineReport> {
        let cancel = CancelToken::new();
        let failure: Mutex<Option<Failure>> = Mutex::new(None);
        let spans_by_track: Vec<OnceLock<Arc<Vec<Span>>>> =
            tracks.iter().map(|_| OnceLock::new()).collect();

        let engine_count = self.engines.len();
        let (engine_txs, engine_rxs): (Vec<Sender<usize>>, Vec<Receiver<usize>>) =
            (0..engine_count).map(|_| bounded(tracks.len().max(1))).unzip();
        let (convert_tx, convert_rx) =
            bounded::<usize>(tracks.len().max(1) * engine_count.max(1));

        std::thread::scope(|scope| {
            // Prep worker: segmentation and chunking, in track order.
            {
                let cancel = cancel.clone();
                let failure = &failure;
                let spans_by_track = &spans_by_track;
                let convert_tx = convert_tx.clone();
                let engine_txs = engine_txs;
                scope.spawn(move || {
                    for (idx, track) in tracks.iter().enumerate() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        match self.prepare_track(track, &cancel) {
                            Ok(spans) => {
                                spans_by_track[idx].set(Arc::new(spans)).ok();
                            }
                            Err(e) => {
                                record_failure(failure, &cancel, track, "prepare", e);
                                break;
                            }
                        }
                        if cancel.is_cancelled() {
                            break;
                        }
                        if engine_count == 0 {
                            if convert_tx.send(idx).is_err() {
                                break;
                            }
                        } else {
                            for tx in &engine_txs {
                                if tx.send(idx).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                });
            }

            // One worker per engine, each with a private queue.
            for (engine, rx) in self.engines.iter().zip(engine_rxs) {
                let engine = engine.clone();
                let cancel = cancel.clone();
                let failure = &failure;
                let spans_by_track = &spans_by_track;
                let convert_tx = convert_tx.clone();
                let config = &self.config;
                let checkpoints = self.checkpoints.clone();
                scope.spawn(move || {
                    loop {
                        let idx = match rx.try_recv() {
                            Ok(idx) => idx,
                            Err(TryRecvError::Empty) => {
                                if cancel.is_cancelled() {
                                    break;
                                }
                                std::thread::sleep(config.poll_interval);
                                continue;
                            }
                            Err(TryRecvError::Disconnected) => break,
                        };
                        if cancel.is_cancelled() {
                            break;
                        }
                        let track = &tracks[idx];
                        // Recognition is gated on the durable record, not on
                        // the in-memory handoff, so a restarted run behaves
                        // the same as an uninterrupted one. A queued track
                        // with no chunk record is a checkpoint anomaly; fail
                        // loudly rather than leave the track half-processed.
                        if let Err(e) = require_chunked(&checkpoints, track) {
                            record_failure(failure, &cancel, track, engine.name(), e);
                            break;
                        }
                        let spans = match spans_by_track[idx].get() {
                            Some(spans) => spans.clone(),
                            None => {
                                record_failure(
                                    failure,
                                    &cancel,
                                    track,
                                    engine.name(),
                                    missing_spans(track),
                                );
                                break;
                            }
                        };
                        let result = if engine.window_policy().is_some() {
                            WindowedRecognizer::new(
                                engine.clone(),
                                config.retry_attempts,
                                config.retry_backoff,
                            )
                            .run(track, &spans, &checkpoints, &cancel)
                        } else {
                            EngineRunner::new(
                                engine.clone(),
                                config.retry_attempts,
                                config.retry_backoff,
                            )
                            .run(track, &spans, &checkpoints, &cancel)
                        };
                        match result {
                            Ok(()) => {
                                if convert_tx.send(idx).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                record_failure(failure, &cancel, track, engine.name(), e);
                                break;
                            }
                        }
                    }
                });
            }
            drop(convert_tx);

            // Convert worker: waits until every engine reported a track.
            {
                let cancel = cancel.clone();
                let failure = &failure;
                let spans_by_track = &spans_by_track;
                let config = &self.config;
                let checkpoints = self.checkpoints.clone();
                let toolchain = self.toolchain.clone();
                let required = engine_count.max(1);
                scope.spawn(move || {
                    let mut reported: HashMap<usize, usize> = HashMap::new();
                    loop {
                        let idx = match convert_rx.try_recv() {
                            Ok(idx) => idx,
                            Err(TryRecvError::Empty) => {
                                if cancel.is_cancelled() {
                                    break;
                                }
                                std::thread::sleep(config.poll_interval);
                                continue;
                            }
                            Err(TryRecvError::Disconnected) => break,
                        };
                        let count = reported.entry(idx).or_insert(0);
                        *count += 1;
                        if *count < required || cancel.is_cancelled() {
                            continue;
                        }
                        let track = &tracks[idx];
                        let spans = match spans_by_track[idx].get() {
                            Some(spans) => spans.clone(),
                            None => {
                                record_failure(
                                    failure,
                                    &cancel,
                                    track,
                                    STAGE_CONVERT,
                                    missing_spans(track),
                                );
                                break;
                            }
                        };
                        if let Err(e) =
                            convert_track(track, &spans, &toolchain, &checkpoints, &cancel, config)
                        {
                            record_failure(failure, &cancel, track, STAGE_CONVERT, e);
                            break;
                        }
                    }
                });
            }
        });

        if let Some((track, stage, message)) =
            failure.lock().unwrap_or_else(|e| e.into_inner()).take()
        {
            return Err(TrackscribeError::StageFailed {
                track,
                stage,
                message,
            });
        }

        Ok(PipelineReport {
            spans_per_track: tracks
                .iter()
                .zip(&spans_by_track)
                .map(|(track, spans)| {
                    (
                        track.speaker.clone(),
                        spans.get().map(|s| s.len()).unwrap_or(0),
                    )
                })
                .collect(),
        })
    }

    /// Segments a track (or trusts the checkpoint) and materializes its
    /// chunks. Returns the track's spans either way.
    fn prepare_track(&self, track: &InputTrack, cancel: &CancelToken) -> Result<Vec<Span>> {
        let spans = if self
            .checkpoints
            .is_stage_done(track, STAGE_SEGMENT, "")
        {
            read_span_list(&track.span_list_file())?
        } else {
            let windows = self.segmenter.segment(track)?;
            let mut builder = SegmentBuilder::new(self.config.builder.clone());
            for window in &windows {
                builder.push_window(window, self.config.segmenter_window_ms);
            }
            let spans = builder.finish(|id| track.chunk_file(id));
            write_span_list(&track.span_list_file(), &spans)?;
            self.checkpoints.mark_done(track, STAGE_SEGMENT, "")?;
            log::info!("{}: {} spans", track.speaker, spans.len());
            spans
        };

        if !self.checkpoints.is_stage_done(track, STAGE_CHUNK, "") {
            let materializer = ChunkMaterializer::new(self.toolchain.clone());
            materializer.materialize(track, &spans, &self.checkpoints, cancel)?;
            if !cancel.is_cancelled() {
                self.checkpoints.mark_done(track, STAGE_CHUNK, "")?;
            }
        }
        Ok(spans)
    }
}

fn convert_track(
    track: &InputTrack,
    spans: &[Span],
    toolchain: &Arc<dyn MediaToolchain>,
    checkpoints: &CheckpointStore,
    cancel: &CancelToken,
    config: &SchedulerConfig,
) -> Result<()> {
    if !checkpoints.is_stage_done(track, STAGE_CONVERT, "") {
        let materializer = ChunkMaterializer::new(toolchain.clone());
        materializer.render_clips(track, spans, cancel)?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        checkpoints.mark_done(track, STAGE_CONVERT, "")?;
    }
    if config.cleanup_chunks {
        for span in spans {
            if span.chunk_path.is_file() {
                fs::remove_file(&span.chunk_path)?;
            }
        }
    }
    Ok(())
}

/// A track handed to a recognition worker must carry a durable chunk record.
fn require_chunked(checkpoints: &CheckpointStore, track: &InputTrack) -> Result<()> {
    if checkpoints.is_stage_done(track, STAGE_CHUNK, "") {
        Ok(())
    } else {
        Err(TrackscribeError::Checkpoint {
            message: format!(
                "{} queued for recognition without a chunk record",
                track.speaker
            ),
        })
    }
}

fn missing_spans(track: &InputTrack) -> TrackscribeError {
    TrackscribeError::SpanList {
        message: format!("{} queued before its span list was built", track.speaker),
    }
}

fn record_failure(
    failure: &Mutex<Option<Failure>>,
    cancel: &CancelToken,
    track: &InputTrack,
    stage: &str,
    error: TrackscribeError,
) {
    log::error!("{}: {stage} failed: {error}", track.speaker);
    let mut slot = failure.lock().unwrap_or_else(|e| e.into_inner());
    if slot.is_none() {
        *slot = Some((
            track.speaker.clone(),
            stage.to_string(),
            error.to_string(),
        ));
    }
    cancel.cancel();
}

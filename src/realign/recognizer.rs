//! Sliding-window recognition with realignment onto the span list.
//!
//! Windowed engines transcribe raw intervals of the original track instead
//! of the pre-cut chunks. The loop walks the track with an adaptive window,
//! realigns each response's timed segments onto the spans, and flushes a
//! span's row as soon as the realignment cursor has moved past it. Progress
//! is the next window start; together with the flushed row count it makes
//! the loop resumable at window granularity.

use crate::checkpoint::{CheckpointStore, recognize_stage};
use crate::defaults;
use crate::engine::result_file::{RecognitionRow, append_row, count_rows};
use crate::engine::retry::with_retry;
use crate::engine::{AudioRequest, EngineError, RecognitionEngine};
use crate::error::{Result, TrackscribeError};
use crate::pipeline::cancel::CancelToken;
use crate::realign::realigner::SpanRealigner;
use crate::realign::window::{WindowController, degenerate_run_start};
use crate::segment::Span;
use crate::track::InputTrack;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Drives one windowed engine over a whole track.
pub struct WindowedRecognizer {
    engine: Arc<dyn RecognitionEngine>,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl WindowedRecognizer {
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

        if spans.is_empty() {
            store.mark_done(track, &stage, &fingerprint)?;
            return Ok(());
        }

        if store.read(track).stage(&stage).progress.is_empty() && result_path.is_file() {
            // Fresh start: whatever is in the file belongs to an
            // invalidated run.
            fs::remove_file(&result_path)?;
        }
        let mut rows_written = count_rows(&result_path);
        if rows_written > spans.len() {
            // More rows than spans: the span list was rebuilt under us.
            store.clear_progress(track, &stage)?;
            return Err(TrackscribeError::ResumeFailed {
                track: track.speaker.clone(),
                stage,
            });
        }

        let policy = self.engine.window_policy().unwrap_or_default();
        let mut controller = WindowController::new(policy);
        let mut realigner = SpanRealigner::with_cursor(spans, rows_written);
        let marker = store.read(track).stage(&stage).progress;
        let mut start_ms = if marker.is_empty() {
            0
        } else {
            match marker.parse::<u64>() {
                Ok(ms) => ms,
                Err(_) => {
                    // A non-numeric marker belongs to some other mode of this
                    // engine (e.g. it ran chunked before being flipped to
                    // windowed). Resuming from it would misplace text.
                    store.clear_progress(track, &stage)?;
                    return Err(TrackscribeError::ResumeFailed {
                        track: track.speaker.clone(),
                        stage,
                    });
                }
            }
        };
        let last_end_ms = spans[spans.len() - 1].end_ms;

        while start_ms < last_end_ms {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let len_ms = controller.current_ms();
            let request = AudioRequest::Window {
                track: &track.path,
                start_ms,
                len_ms,
            };
            let output = with_retry(self.retry_attempts, self.retry_backoff, || {
                self.engine.recognize(&request)
            })
            .map_err(|e| map_engine_err(&name, e))?;

            let next_start_ms = match degenerate_run_start(
                &output.segments,
                controller.unit_ms(),
                defaults::DEGENERACY_MIN_REPEATS,
            ) {
                Some(run_start) => {
                    log::info!(
                        "{}: {name} degenerated at {start_ms}+{len_ms}ms, shrinking window",
                        track.speaker
                    );
                    for segment in &output.segments[..run_start] {
                        realigner.assign(segment);
                    }
                    controller.shrink();
                    // Retry from the next span boundary when that makes
                    // progress, otherwise step by the shrunken window.
                    match spans.get(realigner.cursor() + 1) {
                        Some(next) if next.start_ms > start_ms => next.start_ms,
                        _ => start_ms + controller.current_ms(),
                    }
                }
                None => {
                    for segment in &output.segments {
                        realigner.assign(segment);
                    }
                    controller.grow();
                    start_ms + len_ms
                }
            };

            // Spans the cursor has passed can no longer change.
            while rows_written < realigner.cursor() {
                flush_row(
                    &result_path,
                    track,
                    &spans[rows_written],
                    realigner.text(rows_written),
                )?;
                rows_written += 1;
            }
            store.set_progress(track, &stage, &next_start_ms.to_string(), &fingerprint)?;
            start_ms = next_start_ms;
        }

        while rows_written < spans.len() {
            flush_row(
                &result_path,
                track,
                &spans[rows_written],
                realigner.text(rows_written),
            )?;
            rows_written += 1;
        }
        if !cancel.is_cancelled() {
            store.mark_done(track, &stage, &fingerprint)?;
        }
        Ok(())
    }
}

fn map_engine_err(engine: &str, e: EngineError) -> TrackscribeError {
    match e {
        EngineError::Config { remedy } => TrackscribeError::EngineConfig {
            engine: engine.to_string(),
            remedy,
        },
        other => TrackscribeError::Engine {
            engine: engine.to_string(),
            message: other.to_string(),
        },
    }
}

fn flush_row(result_path: &Path, track: &InputTrack, span: &Span, text: &str) -> Result<()> {
    let text = text.trim();
    append_row(
        result_path,
        &RecognitionRow {
            speaker: track.speaker.clone(),
            clip: track
                .clip_file(span.id)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            start_ms: span.org_start_ms,
            duration_ms: span.org_end_ms.saturating_sub(span.org_start_ms),
            confidence: 0,
            candidates: if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::result_file::read_rows;
    use crate::engine::{AsrSegment, EngineOutput, MockEngine, WindowPolicy};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn make_track(dir: &TempDir) -> InputTrack {
        let path = dir.path().join("alice.wav");
        File::create(&path).unwrap().write_all(b"x").unwrap();
        InputTrack::prepare(&path).unwrap()
    }

    fn spans_for(track: &InputTrack, intervals: &[(u64, u64)]) -> Vec<Span> {
        intervals
            .iter()
            .enumerate()
            .map(|(i, &(start_ms, end_ms))| Span {
                id: i as u64 + 1,
                chunk_path: track.chunk_file(i as u64 + 1),
                start_ms,
                end_ms,
                org_start_ms: start_ms,
                org_end_ms: end_ms,
            })
            .collect()
    }

    fn policy() -> WindowPolicy {
        WindowPolicy {
            initial_ms: 60_000,
            min_ms: 5_000,
            max_ms: 240_000,
            unit_ms: 1_000,
        }
    }

    fn output(segments: &[(u64, u64, &str)]) -> EngineOutput {
        EngineOutput {
            candidates: Vec::new(),
            confidence: 0,
            segments: segments
                .iter()
                .map(|&(start_ms, end_ms, text)| AsrSegment {
                    start_ms,
                    end_ms,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn recognizer(engine: MockEngine) -> WindowedRecognizer {
        WindowedRecognizer::new(Arc::new(engine), 3, Duration::ZERO)
    }

    #[test]
    fn test_single_clean_window_covers_all_spans() {
        let dir = TempDir::new().unwrap();
        let track = make_track(&dir);
        let spans = spans_for(&track, &[(0, 2000), (2000, 5000)]);
        let store = CheckpointStore::new();

        recognizer(MockEngine::new("wit", 'I').with_window_script(
            policy(),
            vec![output(&[(100, 1900, "hello"), (2300, 4700, "world")])],
        ))
        .run(&track, &spans, &store, &CancelToken::new())
        .unwrap();

        let rows = read_rows(&track.result_file("wit")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].candidates, vec!["hello".to_string()]);
        assert_eq!(rows[1].candidates, vec!["world".to_string()]);
        assert!(store.is_stage_done(&track, "recognize_wit", "mock-v1"));
    }

    #[test]
    fn test_degenerate_window_shrinks_and_recovers() {
        let dir = TempDir::new().unwrap();
        let track = make_track(&dir);
        let spans = spans_for(&track, &[(0, 2000), (2000, 5000)]);
        let store = CheckpointStore::new();

        let engine = Arc::new(MockEngine::new("wit", 'I').with_window_script(
            policy(),
            vec![
                // Degenerate from the start: nothing usable.
                output(&[(0, 1000, "loop"), (1000, 2000, "loop")]),
                // Retried with a smaller window, clean.
                output(&[(2300, 4700, "world")]),
            ],
        ));
        WindowedRecognizer::new(engine.clone(), 3, Duration::ZERO)
            .run(&track, &spans, &store, &CancelToken::new())
            .unwrap();

        assert_eq!(
            engine.calls(),
            vec!["window 0+60000".to_string(), "window 2000+30000".to_string()]
        );
        let rows = read_rows(&track.result_file("wit")).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].candidates.is_empty()); // degenerate text discarded
        assert_eq!(rows[1].candidates, vec!["world".to_string()]);
    }

    #[test]
    fn test_resume_from_flushed_rows_and_marker() {
        let dir = TempDir::new().unwrap();
        let track = make_track(&dir);
        let spans = spans_for(&track, &[(0, 2000), (2000, 5000)]);
        let store = CheckpointStore::new();

        // Earlier run flushed span 1 and recorded the next window start.
        flush_row(&track.result_file("wit"), &track, &spans[0], "hello").unwrap();
        store
            .set_progress(&track, "recognize_wit", "2000", "mock-v1")
            .unwrap();

        let engine = Arc::new(
            MockEngine::new("wit", 'I')
                .with_window_script(policy(), vec![output(&[(2300, 4700, "more")])]),
        );
        WindowedRecognizer::new(engine.clone(), 3, Duration::ZERO)
            .run(&track, &spans, &store, &CancelToken::new())
            .unwrap();

        assert_eq!(engine.calls(), vec!["window 2000+60000".to_string()]);
        let rows = read_rows(&track.result_file("wit")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].candidates, vec!["hello".to_string()]);
        assert_eq!(rows[1].candidates, vec!["more".to_string()]);
    }

    #[test]
    fn test_more_rows_than_spans_is_resume_failure() {
        let dir = TempDir::new().unwrap();
        let track = make_track(&dir);
        let spans = spans_for(&track, &[(0, 2000)]);
        let store = CheckpointStore::new();

        flush_row(&track.result_file("wit"), &track, &spans[0], "a").unwrap();
        flush_row(&track.result_file("wit"), &track, &spans[0], "b").unwrap();
        store
            .set_progress(&track, "recognize_wit", "500", "mock-v1")
            .unwrap();

        let result = recognizer(MockEngine::new("wit", 'I').with_window_script(policy(), vec![]))
            .run(&track, &spans, &store, &CancelToken::new());

        assert!(matches!(
            result,
            Err(TrackscribeError::ResumeFailed { .. })
        ));
    }

    #[test]
    fn test_non_numeric_marker_is_resume_failure() {
        let dir = TempDir::new().unwrap();
        let track = make_track(&dir);
        let spans = spans_for(&track, &[(0, 2000)]);
        let store = CheckpointStore::new();

        // Marker left behind by a chunked run of the same engine.
        store
            .set_progress(&track, "recognize_wit", "alice_1.mp3", "mock-v1")
            .unwrap();

        let engine = Arc::new(MockEngine::new("wit", 'I').with_window_script(policy(), vec![]));
        let result = WindowedRecognizer::new(engine.clone(), 3, Duration::ZERO)
            .run(&track, &spans, &store, &CancelToken::new());

        assert!(matches!(
            result,
            Err(TrackscribeError::ResumeFailed { .. })
        ));
        assert!(engine.calls().is_empty());
        assert!(store.read(&track).stage("recognize_wit").progress.is_empty());
    }

    #[test]
    fn test_empty_span_list_marks_done_without_requests() {
        let dir = TempDir::new().unwrap();
        let track = make_track(&dir);
        let store = CheckpointStore::new();

        let engine = Arc::new(MockEngine::new("wit", 'I').with_window_script(policy(), vec![]));
        WindowedRecognizer::new(engine.clone(), 3, Duration::ZERO)
            .run(&track, &[], &store, &CancelToken::new())
            .unwrap();

        assert!(engine.calls().is_empty());
        assert!(store.is_stage_done(&track, "recognize_wit", "mock-v1"));
    }
}

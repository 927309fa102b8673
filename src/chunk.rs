//! Renders span audio into recognizer chunks and playable clips.

use crate::checkpoint::{CheckpointStore, STAGE_CHUNK};
use crate::error::Result;
use crate::media::{MediaToolchain, TranscodeSpec};
use crate::pipeline::cancel::CancelToken;
use crate::segment::Span;
use crate::track::InputTrack;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Cuts chunk files (recognizer input) and clip files (playable excerpts)
/// out of the original track.
pub struct ChunkMaterializer {
    toolchain: Arc<dyn MediaToolchain>,
}

impl ChunkMaterializer {
    pub fn new(toolchain: Arc<dyn MediaToolchain>) -> Self {
        Self { toolchain }
    }

    /// Renders every span's padded interval into its chunk file. Chunks
    /// newer than the span list are kept as-is; everything else is re-cut.
    /// Returns early (without marking the stage done) when cancelled.
    pub fn materialize(
        &self,
        track: &InputTrack,
        spans: &[Span],
        store: &CheckpointStore,
        cancel: &CancelToken,
    ) -> Result<()> {
        let list_mtime = mtime(&track.span_list_file());

        for span in spans {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if is_fresh(&span.chunk_path, list_mtime) {
                continue;
            }

            let tmp = span.chunk_path.with_extension("flac.tmp");
            self.toolchain.transcode(
                &track.path,
                &TranscodeSpec {
                    start_ms: span.start_ms,
                    duration_ms: span.duration_ms(),
                    output: tmp.clone(),
                },
            )?;
            fs::rename(&tmp, &span.chunk_path)?;

            store.set_progress(
                track,
                STAGE_CHUNK,
                &file_name(&span.chunk_path),
                "",
            )?;
        }
        Ok(())
    }

    /// Renders the unpadded speech of each span into a playable clip, cut
    /// from the chunk rather than the original. A missing chunk is logged
    /// and skipped so late-stage conversion never kills the run.
    pub fn render_clips(
        &self,
        track: &InputTrack,
        spans: &[Span],
        cancel: &CancelToken,
    ) -> Result<()> {
        for span in spans {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let clip = track.clip_file(span.id);
            if clip.is_file() {
                continue;
            }
            if !span.chunk_path.is_file() {
                log::debug!(
                    "chunk {} missing, skipping clip {}",
                    span.chunk_path.display(),
                    span.id
                );
                continue;
            }

            let tmp = clip.with_extension("mp3.tmp");
            self.toolchain.transcode(
                &span.chunk_path,
                &TranscodeSpec {
                    start_ms: span.org_start_ms.saturating_sub(span.start_ms),
                    duration_ms: span.org_end_ms.saturating_sub(span.org_start_ms),
                    output: tmp.clone(),
                },
            )?;
            fs::rename(&tmp, &clip)?;
        }
        Ok(())
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn is_fresh(chunk: &Path, list_mtime: Option<SystemTime>) -> bool {
    match (mtime(chunk), list_mtime) {
        (Some(chunk_mtime), Some(list_mtime)) => chunk_mtime > list_mtime,
        _ => false,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

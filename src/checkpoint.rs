//! Durable per-track checkpoints.
//!
//! One JSON record per track, mutated after every completed unit of work.
//! All writes go through a single critical section around a read-modify-write
//! of the whole record, so concurrent stages (different tracks, or different
//! engines on the same track) never interleave partial updates. A corrupt or
//! unreadable record, or a content-hash mismatch, is treated as "nothing
//! done" — the safe default is always redo, never skip.

use crate::error::{Result, TrackscribeError};
use crate::track::InputTrack;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Mutex;

/// Stage key for span-list construction.
pub const STAGE_SEGMENT: &str = "segment";
/// Stage key for chunk materialization.
pub const STAGE_CHUNK: &str = "chunk";
/// Stage key for playable-clip conversion.
pub const STAGE_CONVERT: &str = "convert";

/// Stage key for one recognition engine. Engines run in parallel and each
/// maintains an independent key.
pub fn recognize_stage(engine: &str) -> String {
    format!("recognize_{engine}")
}

/// Completion state of one stage for one track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    /// True once the stage finished for the whole track.
    #[serde(default)]
    pub done: bool,
    /// Opaque progress marker: last completed chunk filename, or the next
    /// window start time in milliseconds.
    #[serde(default)]
    pub progress: String,
    /// Model/engine variant that produced the work. A `done` marker with a
    /// stale fingerprint is treated as not done.
    #[serde(default)]
    pub fingerprint: String,
}

/// Per-track checkpoint record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Content hash of the input the record belongs to.
    pub hash: String,
    #[serde(default)]
    pub stages: BTreeMap<String, StageStatus>,
}

impl Checkpoint {
    /// Status of one stage, defaulting to "nothing done".
    pub fn stage(&self, key: &str) -> StageStatus {
        self.stages.get(key).cloned().unwrap_or_default()
    }

    /// Mutable status of one stage, created on first access.
    pub fn stage_mut(&mut self, key: &str) -> &mut StageStatus {
        self.stages.entry(key.to_string()).or_default()
    }
}

/// Store for per-track checkpoint records.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    lock: Mutex<()>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the record for a track. Missing, unparseable, or hash-mismatched
    /// records yield a fresh record carrying the current hash.
    pub fn read(&self, track: &InputTrack) -> Checkpoint {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        read_record(track)
    }

    /// Atomically merges an update into the record: read, mutate, write via
    /// temp file + rename.
    pub fn update<F>(&self, track: &InputTrack, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Checkpoint),
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut record = read_record(track);
        mutate(&mut record);
        write_record(track, &record)
    }

    /// True when the stage is done *and* was produced by the currently
    /// configured fingerprint. Pass an empty fingerprint for stages that
    /// have no model variant.
    pub fn is_stage_done(&self, track: &InputTrack, stage: &str, fingerprint: &str) -> bool {
        let status = self.read(track).stage(stage);
        status.done && status.fingerprint == fingerprint
    }

    /// Marks a stage done and clears its progress marker.
    pub fn mark_done(&self, track: &InputTrack, stage: &str, fingerprint: &str) -> Result<()> {
        self.update(track, |cp| {
            let status = cp.stage_mut(stage);
            status.done = true;
            status.progress.clear();
            status.fingerprint = fingerprint.to_string();
        })
    }

    /// Records progress after one completed unit of work.
    pub fn set_progress(
        &self,
        track: &InputTrack,
        stage: &str,
        marker: &str,
        fingerprint: &str,
    ) -> Result<()> {
        self.update(track, |cp| {
            let status = cp.stage_mut(stage);
            status.progress = marker.to_string();
            status.fingerprint = fingerprint.to_string();
        })
    }

    /// Clears the progress marker of a stage without touching `done`.
    pub fn clear_progress(&self, track: &InputTrack, stage: &str) -> Result<()> {
        self.update(track, |cp| {
            cp.stage_mut(stage).progress.clear();
        })
    }
}

fn read_record(track: &InputTrack) -> Checkpoint {
    let path = track.checkpoint_file();
    let parsed = fs::read_to_string(&path)
        .ok()
        .and_then(|data| serde_json::from_str::<Checkpoint>(&data).ok());

    match parsed {
        Some(record) if record.hash == track.content_hash => record,
        Some(_) => {
            log::info!(
                "checkpoint for {} has a stale content hash, restarting from scratch",
                track.speaker
            );
            fresh(track)
        }
        None => fresh(track),
    }
}

fn fresh(track: &InputTrack) -> Checkpoint {
    Checkpoint {
        hash: track.content_hash.clone(),
        stages: BTreeMap::new(),
    }
}

fn write_record(track: &InputTrack, record: &Checkpoint) -> Result<()> {
    let path = track.checkpoint_file();
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_string_pretty(record).map_err(|e| TrackscribeError::Checkpoint {
        message: e.to_string(),
    })?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

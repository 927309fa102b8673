//! Merges per-engine result files into one timeline.
//!
//! Rows from all engines land in one list keyed by clip. The first engine to
//! mention a clip creates the row; later engines prepend their candidates
//! and tags, so the newest non-empty recognition leads. Speakers whose rows
//! are all empty drop off the roster.

use crate::engine::result_file::read_rows;
use crate::error::Result;
use crate::track::InputTrack;
use csv::{QuoteStyle, WriterBuilder};
use std::collections::HashMap;
use std::path::Path;

/// One clip of the merged timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub speaker: String,
    pub clip: String,
    pub start_ms: u64,
    pub duration_ms: u64,
    /// One tag character per candidate, identifying the engine.
    pub engine_tags: String,
    /// Candidates across engines, most recently merged engine first.
    pub candidates: Vec<String>,
}

/// Merged output of a whole run.
#[derive(Debug, Clone, Default)]
pub struct MergedTimeline {
    /// All rows, sorted by start time (stable, so same-start rows keep
    /// their merge order).
    pub rows: Vec<MergedRow>,
    /// Speakers with at least one non-empty row.
    pub speakers: Vec<String>,
}

/// Merges every engine's result file for every track. `engines` lists
/// `(name, tag)` pairs in merge order.
pub fn merge_tracks(tracks: &[InputTrack], engines: &[(String, char)]) -> Result<MergedTimeline> {
    let mut rows: Vec<MergedRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for track in tracks {
        for (engine, tag) in engines {
            let path = track.result_file(engine);
            if !path.is_file() {
                continue;
            }
            for row in read_rows(&path)? {
                let key = format!("{}/{}", track.speaker, row.clip);
                match index.get(&key) {
                    Some(&at) => {
                        if row.candidates.iter().all(|c| c.trim().is_empty()) {
                            continue;
                        }
                        let merged = &mut rows[at];
                        let mut candidates = row.candidates.clone();
                        let tags: String = tag.to_string().repeat(candidates.len());
                        candidates.append(&mut merged.candidates);
                        merged.candidates = candidates;
                        merged.engine_tags = format!("{tags}{}", merged.engine_tags);
                    }
                    None => {
                        index.insert(key, rows.len());
                        rows.push(MergedRow {
                            speaker: row.speaker.clone(),
                            clip: row.clip.clone(),
                            start_ms: row.start_ms,
                            duration_ms: row.duration_ms,
                            engine_tags: tag.to_string().repeat(row.candidates.len()),
                            candidates: row.candidates,
                        });
                    }
                }
            }
        }
    }

    rows.sort_by_key(|row| row.start_ms);

    let mut speakers = Vec::new();
    for track in tracks {
        let has_text = rows.iter().any(|row| {
            row.speaker == track.speaker
                && row.candidates.iter().any(|c| !c.trim().is_empty())
        });
        if has_text {
            speakers.push(track.speaker.clone());
        }
    }

    Ok(MergedTimeline { rows, speakers })
}

/// Writes the merged timeline as CSV, every field quoted.
pub fn write_merged_csv(path: &Path, timeline: &MergedTimeline) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .flexible(true)
        .from_path(path)?;

    writer.write_record(["speaker", "clip", "start_ms", "duration_ms", "engines", "text"])?;
    for row in &timeline.rows {
        let mut record = vec![
            row.speaker.clone(),
            row.clip.clone(),
            row.start_ms.to_string(),
            row.duration_ms.to_string(),
            row.engine_tags.clone(),
        ];
        record.extend(row.candidates.iter().cloned());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

//! Per-engine result files.
//!
//! One CSV per (track, engine), appended one row per recognized span so a
//! crashed run loses at most the row in flight. Rows are variable length:
//! the fixed columns are followed by one field per candidate.

use crate::error::Result;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::OpenOptions;
use std::path::Path;

/// One recognized span as stored in a result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionRow {
    pub speaker: String,
    /// Clip file name; doubles as the resume marker.
    pub clip: String,
    pub start_ms: u64,
    pub duration_ms: u64,
    /// Confidence in percent, 0 when unknown.
    pub confidence: u8,
    /// Candidates, best first. Empty when the span decoded to silence.
    pub candidates: Vec<String>,
}

/// Appends one row, creating the file on first use. Flushed before
/// returning so the row survives a crash.
pub fn append_row(path: &Path, row: &RecognitionRow) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(file);

    let mut record = StringRecord::new();
    record.push_field(&row.speaker);
    record.push_field(&row.clip);
    record.push_field(&row.start_ms.to_string());
    record.push_field(&row.duration_ms.to_string());
    record.push_field(&row.confidence.to_string());
    for candidate in &row.candidates {
        record.push_field(candidate);
    }
    writer.write_record(&record)?;
    writer.flush()?;
    Ok(())
}

/// Reads all rows of a result file, in file order.
pub fn read_rows(path: &Path) -> Result<Vec<RecognitionRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 5 {
            continue;
        }
        rows.push(RecognitionRow {
            speaker: record[0].to_string(),
            clip: record[1].to_string(),
            start_ms: record[2].parse().unwrap_or(0),
            duration_ms: record[3].parse().unwrap_or(0),
            confidence: record[4].parse().unwrap_or(0),
            candidates: record.iter().skip(5).map(str::to_string).collect(),
        });
    }
    Ok(rows)
}

/// Row count of a result file; 0 when the file does not exist yet.
pub fn count_rows(path: &Path) -> usize {
    if !path.is_file() {
        return 0;
    }
    read_rows(path).map(|rows| rows.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(clip: &str, candidates: &[&str]) -> RecognitionRow {
        RecognitionRow {
            speaker: "alice".to_string(),
            clip: clip.to_string(),
            start_ms: 1000,
            duration_ms: 2000,
            confidence: 85,
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_append_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_alice_google.csv");

        append_row(&path, &row("alice_1.mp3", &["hello there", "hello their"])).unwrap();
        append_row(&path, &row("alice_2.mp3", &[])).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].clip, "alice_1.mp3");
        assert_eq!(rows[0].candidates.len(), 2);
        assert!(rows[1].candidates.is_empty());
    }

    #[test]
    fn test_candidates_with_commas_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.csv");

        append_row(&path, &row("alice_1.mp3", &["well, yes, exactly"])).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows[0].candidates, vec!["well, yes, exactly".to_string()]);
    }

    #[test]
    fn test_count_rows_missing_file_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(count_rows(&dir.path().join("nope.csv")), 0);
    }

    #[test]
    fn test_count_rows_matches_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.csv");
        for i in 0..3 {
            append_row(&path, &row(&format!("alice_{i}.mp3"), &["x"])).unwrap();
        }
        assert_eq!(count_rows(&path), 3);
    }
}

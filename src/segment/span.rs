//! The span list: the authoritative record of what gets recognized.
//!
//! One tab-separated line per span. The padded interval `[start, end)` is
//! what the recognizer hears; `[org_start, org_end)` is the unpadded speech
//! it came from, kept for clip rendering. Older span lists carry only the
//! first five fields, in which case the original interval defaults to the
//! padded one.

use crate::error::{Result, TrackscribeError};
use std::fs;
use std::path::{Path, PathBuf};

/// One padded speech span of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// 1-based span id, stable across runs.
    pub id: u64,
    /// Chunk file the span is rendered into.
    pub chunk_path: PathBuf,
    /// Padded start, milliseconds.
    pub start_ms: u64,
    /// Padded end, milliseconds.
    pub end_ms: u64,
    /// Unpadded speech start.
    pub org_start_ms: u64,
    /// Unpadded speech end.
    pub org_end_ms: u64,
}

impl Span {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Writes the span list atomically (temp file + rename).
pub fn write_span_list(path: &Path, spans: &[Span]) -> Result<()> {
    let mut out = String::new();
    for span in spans {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            span.id,
            span.chunk_path.display(),
            span.start_ms,
            span.end_ms,
            span.duration_ms(),
            span.org_start_ms,
            span.org_end_ms,
        ));
    }
    let tmp = path.with_extension("txt.tmp");
    fs::write(&tmp, out)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads a span list back, in file order.
pub fn read_span_list(path: &Path) -> Result<Vec<Span>> {
    let data = fs::read_to_string(path).map_err(|e| TrackscribeError::SpanList {
        message: format!("{}: {e}", path.display()),
    })?;

    let mut spans = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(TrackscribeError::SpanList {
                message: format!(
                    "{}:{}: expected at least 5 tab-separated fields",
                    path.display(),
                    lineno + 1
                ),
            });
        }

        let parse_ms = |field: &str, name: &str| -> Result<u64> {
            // Written by older tooling as fractional milliseconds.
            field
                .parse::<f64>()
                .map(|v| v as u64)
                .map_err(|_| TrackscribeError::SpanList {
                    message: format!("{}:{}: bad {name}", path.display(), lineno + 1),
                })
        };

        let id = fields[0].parse::<u64>().map_err(|_| TrackscribeError::SpanList {
            message: format!("{}:{}: bad span id", path.display(), lineno + 1),
        })?;
        let start_ms = parse_ms(fields[2], "start")?;
        let end_ms = parse_ms(fields[3], "end")?;
        let org_start_ms = match fields.get(5) {
            Some(f) => parse_ms(f, "org_start")?,
            None => start_ms,
        };
        let org_end_ms = match fields.get(6) {
            Some(f) => parse_ms(f, "org_end")?,
            None => end_ms,
        };

        spans.push(Span {
            id,
            chunk_path: PathBuf::from(fields[1]),
            start_ms,
            end_ms,
            org_start_ms,
            org_end_ms,
        });
    }
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn span(id: u64, start_ms: u64, end_ms: u64) -> Span {
        Span {
            id,
            chunk_path: PathBuf::from(format!("work/a_{id}.flac")),
            start_ms,
            end_ms,
            org_start_ms: start_ms + 100,
            org_end_ms: end_ms - 100,
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_a_split.txt");
        let spans = vec![span(1, 0, 2000), span(2, 2500, 8000)];

        write_span_list(&path, &spans).unwrap();
        let read = read_span_list(&path).unwrap();

        assert_eq!(read, spans);
    }

    #[test]
    fn test_short_lines_default_original_interval() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_a_split.txt");
        fs::write(&path, "1\twork/a_1.flac\t0\t2000\t2000\n").unwrap();

        let read = read_span_list(&path).unwrap();
        assert_eq!(read[0].org_start_ms, 0);
        assert_eq!(read[0].org_end_ms, 2000);
    }

    #[test]
    fn test_fractional_times_truncate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_a_split.txt");
        fs::write(&path, "1\twork/a_1.flac\t100.7\t2000.2\t1899.5\n").unwrap();

        let read = read_span_list(&path).unwrap();
        assert_eq!(read[0].start_ms, 100);
        assert_eq!(read[0].end_ms, 2000);
    }

    #[test]
    fn test_truncated_line_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_a_split.txt");
        fs::write(&path, "1\twork/a_1.flac\t0\n").unwrap();

        assert!(matches!(
            read_span_list(&path),
            Err(TrackscribeError::SpanList { .. })
        ));
    }

    #[test]
    fn test_write_is_atomic_no_tmp_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_a_split.txt");
        write_span_list(&path, &[span(1, 0, 1000)]).unwrap();

        assert!(path.is_file());
        assert!(!path.with_extension("txt.tmp").exists());
    }
}

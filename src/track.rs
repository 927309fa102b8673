//! Input tracks and their on-disk workspace layout.
//!
//! Every input file gets a work directory named after its stem, next to the
//! input, holding all derived artifacts: VAD window files, the span list,
//! chunk files, playable clips, per-engine result files, and the checkpoint.

use crate::error::{Result, TrackscribeError};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// One audio stream to transcribe.
#[derive(Debug, Clone)]
pub struct InputTrack {
    /// Path to the original recording.
    pub path: PathBuf,
    /// Speaker label, the input file stem.
    pub speaker: String,
    /// Work directory for derived artifacts.
    pub workdir: PathBuf,
    /// SHA-256 of the input file contents; a change invalidates all
    /// checkpoints for the track.
    pub content_hash: String,
}

impl InputTrack {
    /// Hashes the input file and creates the work directory.
    pub fn prepare(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(TrackscribeError::TrackNotFound {
                path: path.display().to_string(),
            });
        }

        let speaker = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| TrackscribeError::TrackNotFound {
                path: path.display().to_string(),
            })?;

        let basedir = path.parent().unwrap_or_else(|| Path::new("."));
        let workdir = basedir.join(&speaker);
        fs::create_dir_all(&workdir)?;

        let content_hash = hash_file(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            speaker,
            workdir,
            content_hash,
        })
    }

    /// VAD window file left behind by the external segmenter.
    pub fn window_file(&self, index: usize) -> PathBuf {
        self.workdir.join(format!("_{}_{}.txt", self.speaker, index))
    }

    /// Authoritative span list (tab-separated, one line per span).
    pub fn span_list_file(&self) -> PathBuf {
        self.workdir.join(format!("_{}_split.txt", self.speaker))
    }

    /// Recognizer-input chunk for one span.
    pub fn chunk_file(&self, id: u64) -> PathBuf {
        self.workdir.join(format!("{}_{}.flac", self.speaker, id))
    }

    /// Playable clip rendered from a chunk after recognition.
    pub fn clip_file(&self, id: u64) -> PathBuf {
        self.workdir.join(format!("{}_{}.mp3", self.speaker, id))
    }

    /// Result file for one recognition engine.
    pub fn result_file(&self, engine: &str) -> PathBuf {
        self.workdir
            .join(format!("_{}_{}.csv", self.speaker, engine))
    }

    /// Durable checkpoint record for this track.
    pub fn checkpoint_file(&self) -> PathBuf {
        self.workdir.join(format!("_{}.ckpt.json", self.speaker))
    }
}

/// SHA-256 of a file's contents, streamed, as lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn make_track(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_prepare_creates_workdir_and_hash() {
        let dir = TempDir::new().unwrap();
        let path = make_track(&dir, "alice.wav", b"audio bytes");

        let track = InputTrack::prepare(&path).unwrap();

        assert_eq!(track.speaker, "alice");
        assert!(track.workdir.is_dir());
        assert_eq!(track.workdir, dir.path().join("alice"));
        assert_eq!(track.content_hash.len(), 64);
    }

    #[test]
    fn test_prepare_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let result = InputTrack::prepare(&dir.path().join("missing.wav"));
        assert!(matches!(
            result,
            Err(TrackscribeError::TrackNotFound { .. })
        ));
    }

    #[test]
    fn test_hash_changes_with_contents() {
        let dir = TempDir::new().unwrap();
        let a = make_track(&dir, "a.wav", b"one");
        let b = make_track(&dir, "b.wav", b"two");

        assert_ne!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn test_hash_stable_for_same_contents() {
        let dir = TempDir::new().unwrap();
        let a = make_track(&dir, "a.wav", b"same");
        assert_eq!(hash_file(&a).unwrap(), hash_file(&a).unwrap());
    }

    #[test]
    fn test_artifact_paths_share_workdir() {
        let dir = TempDir::new().unwrap();
        let path = make_track(&dir, "bob.flac", b"x");
        let track = InputTrack::prepare(&path).unwrap();

        assert_eq!(
            track.window_file(0),
            track.workdir.join("_bob_0.txt")
        );
        assert_eq!(
            track.span_list_file(),
            track.workdir.join("_bob_split.txt")
        );
        assert_eq!(track.chunk_file(3), track.workdir.join("bob_3.flac"));
        assert_eq!(track.clip_file(3), track.workdir.join("bob_3.mp3"));
        assert_eq!(
            track.result_file("whisper"),
            track.workdir.join("_bob_whisper.csv")
        );
        assert_eq!(
            track.checkpoint_file(),
            track.workdir.join("_bob.ckpt.json")
        );
    }
}

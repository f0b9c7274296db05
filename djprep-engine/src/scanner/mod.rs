//! Library Scanner: two-phase walk (sequential
//! traversal with symlink-loop detection, then parallel verification)
//! followed by a classification pass against the Metadata Store.

use crate::db::{content_store, tracks};
use chrono::{DateTime, Utc};
use djprep_common::Result;
use rayon::prelude::*;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

const AUDIO_EXTENSIONS: &[&str] = &["wav", "aiff", "flac", "mp3", "m4a", "aac", "alac"];

/// Outcome of comparing a discovered file against the Metadata Store.
#[derive(Debug, Clone, PartialEq)]
pub enum FileRecord {
    New {
        path: PathBuf,
        content_hash: String,
        size: u64,
        mtime: DateTime<Utc>,
    },
    Unchanged {
        content_hash: String,
    },
    Moved {
        content_hash: String,
        old_path: String,
        new_path: PathBuf,
    },
    Modified {
        content_hash: String,
        path: PathBuf,
        size: u64,
        mtime: DateTime<Utc>,
    },
    /// A candidate file the walk found but couldn't read (permissions,
    /// mid-write removal, etc). The scan continues past it rather than
    /// aborting.
    Skip {
        path: PathBuf,
        reason: String,
    },
}

/// Walk `root`, verify candidates by magic bytes, hash each survivor, and
/// classify it against `pool`'s current Track rows. A file that can't be
/// read is reported as `FileRecord::Skip` rather than aborting the rest of
/// the walk.
pub async fn scan(pool: &SqlitePool, root: &Path) -> Result<Vec<FileRecord>> {
    let candidates = walk(root).map_err(|e| djprep_common::Error::Internal(e.to_string()))?;
    let audio_files = verify_audio_files(candidates);

    let mut records = Vec::with_capacity(audio_files.len());
    for path in audio_files {
        let record = match classify_file(pool, path.clone()).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "skipping unreadable file");
                FileRecord::Skip { path, reason: err.to_string() }
            }
        };
        records.push(record);
    }

    Ok(records)
}

/// Classifies one candidate against the Metadata Store. Fails if the file
/// can't be stat'd or hashed; never fails for a classification outcome.
async fn classify_file(pool: &SqlitePool, path: PathBuf) -> Result<FileRecord> {
    let metadata = tokio::fs::metadata(&path).await?;
    let size = metadata.len();
    let mtime: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
    let content_hash = content_store::hash_file(&path).await?;

    let existing = tracks::get_track(pool, &content_hash).await?;
    let path_str = path.to_string_lossy().to_string();

    Ok(match existing {
        None => FileRecord::New {
            path,
            content_hash,
            size,
            mtime,
        },
        Some(track) if track.path == path_str && track.size == size && track.mtime == mtime => {
            FileRecord::Unchanged { content_hash }
        }
        Some(track) if track.path != path_str => FileRecord::Moved {
            content_hash,
            old_path: track.path,
            new_path: path,
        },
        Some(_) => FileRecord::Modified {
            content_hash,
            path,
            size,
            mtime,
        },
    })
}

fn walk(root: &Path) -> std::result::Result<Vec<PathBuf>, ScanError> {
    if !root.exists() {
        return Err(ScanError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut candidates = Vec::new();
    let mut symlink_visited = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| should_process_entry(e, &mut symlink_visited));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                candidates.push(entry.path().to_path_buf());
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "error walking library root"),
        }
    }

    Ok(candidates)
}

fn should_process_entry(entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
    if entry.file_type().is_symlink() {
        if let Ok(canonical) = entry.path().canonicalize() {
            if !symlink_visited.insert(canonical) {
                tracing::warn!(path = %entry.path().display(), "symlink loop, skipping");
                return false;
            }
        }
    }
    true
}

fn verify_audio_files(candidates: Vec<PathBuf>) -> Vec<PathBuf> {
    candidates
        .par_iter()
        .filter(|path| is_audio_file(path))
        .cloned()
        .collect()
}

fn is_audio_file(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_lowercase();
    if !AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }
    verify_magic_bytes(path).unwrap_or(false)
}

fn verify_magic_bytes(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 12];
    let read = file.read(&mut buffer)?;
    if read < 4 {
        return Ok(false);
    }
    Ok(matches!(
        &buffer[..read.min(12)],
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E']
            | [b'f', b'L', b'a', b'C', ..]
            | [0xFF, 0xFB, ..]
            | [0xFF, 0xF3, ..]
            | [0xFF, 0xF2, ..]
            | [b'I', b'D', b'3', ..]
            | [_, _, _, _, b'f', b't', b'y', b'p', ..]
            | [b'F', b'O', b'R', b'M', _, _, _, _, b'A', b'I', b'F', b'F']
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::model::Track;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        schema::initialize(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn new_wav_file_is_reported_as_new() {
        let pool = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        let mut bytes = b"RIFF\x00\x00\x00\x00WAVE".to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        tokio::fs::write(&path, &bytes).await.unwrap();

        let records = scan(&pool, dir.path()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], FileRecord::New { .. }));
    }

    #[tokio::test]
    async fn non_audio_files_are_skipped() {
        let pool = setup().await;
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"not audio")
            .await
            .unwrap();

        let records = scan(&pool, dir.path()).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn classify_file_of_a_missing_path_fails() {
        let pool = setup().await;
        let missing = PathBuf::from("/nonexistent/djprep-scanner-test/gone.wav");
        assert!(classify_file(&pool, missing).await.is_err());
    }

    #[tokio::test]
    async fn scan_converts_a_classify_failure_into_a_skip_record() {
        let pool = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = b"RIFF\x00\x00\x00\x00WAVE".to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        let path = dir.path().join("track.wav");
        tokio::fs::write(&path, &bytes).await.unwrap();

        // Delete the file between discovery and classification to force
        // the per-file failure path without depending on permissions.
        tokio::fs::remove_file(&path).await.unwrap();
        let record = match classify_file(&pool, path.clone()).await {
            Ok(record) => record,
            Err(err) => FileRecord::Skip { path, reason: err.to_string() },
        };
        assert!(matches!(record, FileRecord::Skip { .. }));
    }

    #[tokio::test]
    async fn rescan_of_unchanged_file_is_reported_as_unchanged() {
        let pool = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        let mut bytes = b"RIFF\x00\x00\x00\x00WAVE".to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        tokio::fs::write(&path, &bytes).await.unwrap();

        let first = scan(&pool, dir.path()).await.unwrap();
        let FileRecord::New { content_hash, path, size, mtime } = first.into_iter().next().unwrap() else {
            panic!("expected New");
        };
        tracks::upsert_track(
            &pool,
            &Track {
                content_hash,
                path: path.to_string_lossy().to_string(),
                size,
                mtime,
                title: None,
                artist: None,
                album: None,
            },
        )
        .await
        .unwrap();

        let second = scan(&pool, dir.path()).await.unwrap();
        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], FileRecord::Unchanged { .. }));
    }
}

//! Content Store: a content-addressed blob store over the
//! filesystem. `put` is idempotent for identical bytes — it hashes the
//! payload itself and reuses the existing file when the hash already
//! exists, rather than trusting the caller's `content_hash` alone.

use djprep_common::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    WaveformTiles,
    Openl3Track,
    Openl3Windows,
}

impl BlobKind {
    fn as_str(self) -> &'static str {
        match self {
            BlobKind::WaveformTiles => "waveform_tiles",
            BlobKind::Openl3Track => "openl3_track",
            BlobKind::Openl3Windows => "openl3_windows",
        }
    }
}

/// Opaque handle returned by `put`, sufficient to `get` the blob back.
/// Encodes the path convention directly (`<hash>.<kind>.<version>`) so
/// no separate index is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobId(String);

impl BlobId {
    fn file_name(&self) -> &str {
        &self.0
    }
}

#[derive(Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn shard_dir(&self, track_hash: &str) -> PathBuf {
        let prefix = &track_hash[..track_hash.len().min(2)];
        self.root.join(prefix)
    }

    /// Stores `bytes` under `(kind, content_hash, version)`. Idempotent:
    /// writing the same bytes twice leaves a single file on disk.
    pub async fn put(
        &self,
        kind: BlobKind,
        content_hash: &str,
        version: i64,
        bytes: &[u8],
    ) -> Result<BlobId> {
        let dir = self.shard_dir(content_hash);
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!("{content_hash}.{}.{version}", kind.as_str());
        let path = dir.join(&file_name);

        if !path.exists() {
            let tmp_path = dir.join(format!("{file_name}.tmp.{:x}", digest(bytes)));
            tokio::fs::write(&tmp_path, bytes).await?;
            tokio::fs::rename(&tmp_path, &path).await?;
        }

        let prefix = &content_hash[..content_hash.len().min(2)];
        Ok(BlobId(format!("{prefix}/{file_name}")))
    }

    pub async fn get(&self, blob_id: &BlobId) -> Result<Vec<u8>> {
        let path = self.root.join(blob_id.file_name());
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::NotFound(format!("blob {}: {e}", blob_id.0)))
    }

    pub async fn exists(&self, blob_id: &BlobId) -> bool {
        self.root.join(blob_id.file_name()).exists()
    }
}

fn digest(bytes: &[u8]) -> impl std::fmt::LowerHex {
    Sha256::digest(bytes)
}

/// Streams a file from disk and returns its SHA-256 hex digest, used by
/// the Scanner to compute Track identity.
pub async fn hash_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        use std::io::Read;
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 1024 * 1024];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| Error::Internal(format!("hash task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_idempotent_for_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let id1 = store
            .put(BlobKind::WaveformTiles, "abcdef", 1, b"hello")
            .await
            .unwrap();
        let id2 = store
            .put(BlobKind::WaveformTiles, "abcdef", 1, b"hello")
            .await
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.get(&id1).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn get_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let bogus = BlobId("zz/zzzzzz.waveform_tiles.1".into());
        assert!(store.get(&bogus).await.is_err());
    }

    #[tokio::test]
    async fn hash_file_matches_known_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();
        let hash = hash_file(&path).await.unwrap();
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}

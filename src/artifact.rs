//! Content-addressed storage for fetched page text

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Errors from an artifact store
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persists content under its digest and returns a locator for it
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, digest: &str, content: &str) -> Result<String, ArtifactError>;
}

/// Writes `<dir>/<digest>.md`
///
/// Content lands in a temporary file first and is renamed into place, so a
/// visible artifact is always complete.
#[derive(Debug)]
pub struct FsArtifactStore {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FsArtifactStore {
    /// Opens the store, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ArtifactError::Write {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn path_for(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{}.md", digest))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, digest: &str, content: &str) -> Result<String, ArtifactError> {
        let path = self.path_for(digest);

        // Same digest means same content, unless an older write was cut short
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() && meta.len() == content.len() as u64 {
                return Ok(path.display().to_string());
            }
        }

        let tmp = self.dir.join(format!(
            "{}.md.{}-{}.tmp",
            digest,
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(source) = tokio::fs::write(&tmp, content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ArtifactError::Write { path: tmp, source });
        }

        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ArtifactError::Write { path, source });
        }

        Ok(path.display().to_string())
    }
}

/// Keeps artifacts in memory
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, digest: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(digest)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, digest: &str, content: &str) -> Result<String, ArtifactError> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(digest.to_string())
            .or_insert_with(|| content.to_string());
        Ok(format!("mem://{}", digest))
    }
}

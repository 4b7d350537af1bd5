use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StorageError;

/// Reference to a stored blob
pub type BlobRef = String;

/// Durable blob storage used for documents and recording segments
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<BlobRef, StorageError>;

    /// Deleting a missing blob is not an error
    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Blob store rooted at a local directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("Blob store rooted at {}", root.display());
        Self { root }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(format!("invalid blob path {:?}", path));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<BlobRef, StorageError> {
        let write_failed = |reason: String| StorageError::WriteFailed {
            path: path.to_string(),
            reason,
        };

        let target = self.resolve(path).map_err(write_failed)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_failed(e.to_string()))?;
        }

        // Write-then-rename so readers never see a partial blob
        let staging = target.with_extension("partial");
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|e| write_failed(e.to_string()))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| write_failed(e.to_string()))?;

        debug!("Stored blob {} ({} bytes)", target.display(), bytes.len());

        Ok(format!("file://{}", target.display()))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path).map_err(|reason| StorageError::DeleteFailed {
            path: path.to_string(),
            reason,
        })?;

        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed {
                path: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Blob store kept in memory
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<BlobRef, StorageError> {
        self.blobs
            .write()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(format!("mem://{}", path))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.blobs.write().await.remove(path);
        Ok(())
    }
}

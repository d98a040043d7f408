//! Blob storage seam.
//!
//! The backend is a collaborator: the core needs put/get/delete by key.
//! [`FsBlobStore`] keeps blobs under a local directory; object stores
//! plug in behind the same trait.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Bytes>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed blob store. Keys map to paths under `root`; key
/// components that would escape the root are rejected.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path under the root. Keys arrive from the
    /// network, so parent-dir and prefix components are refused.
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(SyncError::InvalidBlobKey(key.to_string()));
        }

        let rel = Path::new(key.trim_start_matches('/'));
        let mut safe = PathBuf::new();
        for component in rel.components() {
            match component {
                Component::Normal(c) => safe.push(c),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(SyncError::InvalidBlobKey(key.to_string()));
                }
            }
        }
        if safe.as_os_str().is_empty() {
            return Err(SyncError::InvalidBlobKey(key.to_string()));
        }

        Ok(self.root.join(safe))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        tracing::debug!(key, bytes = data.len(), "blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.key_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::BlobNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::BlobNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

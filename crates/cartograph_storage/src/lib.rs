//! Blob storage for run artefacts.
//!
//! The store is keyed by relative path; the path namespace pattern is
//! `{domain}/{identity}/{subkey}/{filename}` (see
//! `cartograph_protocol::paths::run_asset_path`). Concurrent writers use
//! distinct job-id prefixes, so the store needs no locking of its own.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use cartograph_protocol::StorageConfig;

/// Storage operation result type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Blob storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Storage backend {0} not compiled in. Rebuild with the '{1}' feature.")]
    NotCompiled(String, String),
}

/// Byte storage addressed by relative path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn download(&self, path: &str) -> Result<Vec<u8>>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Build the configured backend. The s3 variant is recognised by the config
/// grammar but requires a build with that backend compiled in.
pub fn open(config: &StorageConfig) -> Result<Box<dyn BlobStore>> {
    match config {
        StorageConfig::Local { root } => Ok(Box::new(LocalStore::new(root.clone()))),
        StorageConfig::S3 { .. } => Err(StorageError::NotCompiled(
            "s3".to_string(),
            "s3".to_string(),
        )),
    }
}

/// Filesystem-backed blob store rooted at a directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Join a relative blob path under the root, rejecting absolute paths
    /// and any traversal component.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if rel.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        }) {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        if path.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    path: path.to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|source| StorageError::Io {
                path: path.to_string(),
                source,
            })?;
        debug!(path, bytes = bytes.len(), "Blob stored");
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(source) => Err(StorageError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(source) => Err(StorageError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[tokio::test]
    async fn upload_download_round_trip() {
        let (_dir, store) = local();
        store
            .upload("test-runs/j1/screenshots/a.png", b"png-bytes")
            .await
            .unwrap();
        let bytes = store
            .download("test-runs/j1/screenshots/a.png")
            .await
            .unwrap();
        assert_eq!(bytes, b"png-bytes");
        assert!(store
            .exists("test-runs/j1/screenshots/a.png")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_then_missing() {
        let (_dir, store) = local();
        store.upload("test-runs/j1/dom/page.html", b"<html>").await.unwrap();
        store.delete("test-runs/j1/dom/page.html").await.unwrap();
        assert!(!store.exists("test-runs/j1/dom/page.html").await.unwrap());
        assert!(matches!(
            store.download("test-runs/j1/dom/page.html").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let (_dir, store) = local();
        assert!(matches!(
            store.upload("../outside", b"x").await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            store.download("/etc/passwd").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn s3_backend_reports_not_compiled() {
        let config = StorageConfig::S3 {
            bucket: "b".into(),
            region: "us-east-1".into(),
            prefix: String::new(),
        };
        assert!(matches!(
            open(&config),
            Err(StorageError::NotCompiled(_, _))
        ));
    }
}

//! Filesystem collaborator
//!
//! Only two questions are asked of the filesystem: does a downloaded file
//! still exist, and can it be removed. Neither call fails with an error.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

/// Filesystem access used by the resolver and the download registry
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Whether `path` names an existing regular file
    async fn is_file(&self, path: &Path) -> bool;

    /// Remove a file, returning whether it is gone afterwards
    async fn remove(&self, path: &Path) -> bool;
}

/// [`FileSystem`] backed by `tokio::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn is_file(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                debug!("stat {} failed: {}", path.display(), e);
                false
            }
        }
    }

    async fn remove(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            // Already gone is as good as deleted
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_is_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.mp3");
        std::fs::write(&file, b"ID3").unwrap();

        let fs = LocalFileSystem;
        assert!(fs.is_file(&file).await);
        assert!(!fs.is_file(dir.path()).await);
        assert!(!fs.is_file(&dir.path().join("missing.mp3")).await);
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.mp3");
        std::fs::write(&file, b"ID3").unwrap();

        let fs = LocalFileSystem;
        assert!(fs.remove(&file).await);
        assert!(!file.exists());
        // Removing twice still reports success
        assert!(fs.remove(&file).await);
        // A directory cannot be removed as a file
        assert!(!fs.remove(dir.path()).await);
    }
}

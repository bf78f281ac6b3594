//! Filesystem abstraction used by the ingestion pipeline
//!
//! The pipeline only talks to [`FileSystem`], so tests can inject failures
//! (a locked destination, a full disk) without touching real directories.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Move `from` to `to`, replacing any existing file at `to`
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Regular files directly inside `dir`, sorted by path
    async fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// [`FileSystem`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        // rename(2) and MoveFileEx both replace an existing destination
        tokio::fs::rename(from, to).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }
}

//! Shared helpers for ingestion integration tests
#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edi_router::ingest::{
    DirectoryLayout, EventBus, FileSystem, IngestionPipeline, RetryPolicy, TokioFileSystem,
};
use tempfile::TempDir;

/// A well-formed 850 interchange with one group and one transaction set
pub const VALID_850: &str = "ISA*00*          *00*          *ZZ*ACMECORP       *ZZ*PARTNERCO      \
*250115*0930*^*00501*000000101*0*P*>~GS*PO*ACMECORP*PARTNERCO*20250115*0930*101*X*005010~\
ST*850*0001~BEG*00*SA*PO-4471**20250115~SE*3*0001~GE*1*101~IEA*1*000000101~";

pub const NOT_EDI: &str = "order_id,qty\n4471,10\n";

/// Scratch base directory with the default layout under it
pub struct TestDirs {
    _temp: TempDir,
    pub base: PathBuf,
    pub layout: DirectoryLayout,
}

impl TestDirs {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let base = temp.path().to_path_buf();
        let layout = DirectoryLayout::under(&base);
        Self {
            _temp: temp,
            base,
            layout,
        }
    }

    /// Create all four directories
    pub fn create_all(&self) {
        for dir in self.layout.all() {
            std::fs::create_dir_all(dir).expect("Failed to create directory");
        }
    }

    pub fn drop_incoming(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.layout.incoming.join(name);
        std::fs::write(&path, contents).expect("Failed to write incoming file");
        path
    }

    pub fn names_in(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        delay: Duration::from_millis(5),
    }
}

pub fn pipeline_with(
    layout: DirectoryLayout,
    retry: RetryPolicy,
    fs: Arc<dyn FileSystem>,
) -> Arc<IngestionPipeline> {
    Arc::new(IngestionPipeline::with_file_system(layout, retry, EventBus::new(4), fs))
}

/// Real filesystem whose renames fail on demand
#[derive(Default)]
pub struct FlakyFileSystem {
    inner: TokioFileSystem,
    remaining_failures: AtomicU32,
    blocked_dir: Option<PathBuf>,
    rename_calls: AtomicU32,
}

impl FlakyFileSystem {
    /// The first `count` renames fail, later ones go through
    pub fn failing_first(count: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(count),
            ..Self::default()
        }
    }

    /// Every rename into `dir` fails
    pub fn blocking(dir: impl Into<PathBuf>) -> Self {
        Self {
            blocked_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn rename_calls(&self) -> u32 {
        self.rename_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystem for FlakyFileSystem {
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.rename_calls.fetch_add(1, Ordering::SeqCst);

        let consumed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"));
        }

        if let Some(blocked) = &self.blocked_dir {
            if to.parent() == Some(blocked.as_path()) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "destination locked"));
            }
        }

        self.inner.rename(from, to).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.inner.write(path, contents).await
    }

    async fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.list_files(dir).await
    }
}

/// Poll `condition` every 20ms until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

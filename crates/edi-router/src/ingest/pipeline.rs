//! File ingestion pipeline
//!
//! Moves one discovered file through `incoming -> processing -> archive`,
//! or into `errors/` with a companion `.log` when anything after the claim
//! fails. Every `process` call ends with exactly one counter increment and
//! one [`FileProcessedEvent`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{EventBus, EventSubscription, FileProcessedEvent};
use super::fs::{FileSystem, TokioFileSystem};
use super::layout::DirectoryLayout;
use super::ProcessingState;
use crate::error::IngestError;
use crate::x12::EnvelopeParser;

/// Default number of move attempts
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default pause between move attempts (in milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Inserted between the original stem and the timestamp of a quarantined file
pub const ERROR_MARKER: &str = "_ERROR_";

const ERROR_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// How often, and how patiently, a failed move is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

pub struct IngestionPipeline {
    layout: DirectoryLayout,
    fs: Arc<dyn FileSystem>,
    parser: EnvelopeParser,
    retry: RetryPolicy,
    events: EventBus,
    processed: AtomicU64,
    abort: CancellationToken,
}

impl IngestionPipeline {
    /// Pipeline over the real filesystem
    pub fn new(layout: DirectoryLayout, retry: RetryPolicy, events: EventBus) -> Self {
        Self::with_file_system(layout, retry, events, Arc::new(TokioFileSystem))
    }

    pub fn with_file_system(
        layout: DirectoryLayout,
        retry: RetryPolicy,
        events: EventBus,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            layout,
            fs,
            parser: EnvelopeParser::new(),
            retry,
            events,
            processed: AtomicU64::new(0),
            abort: CancellationToken::new(),
        }
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn subscribe(&self) -> Result<EventSubscription, IngestError> {
        self.events.subscribe()
    }

    /// Number of `process` calls that have completed
    pub fn total_processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Interrupt any retry sleep in progress and every later one
    pub fn abort(&self) {
        self.abort.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Create the four managed directories. Failure here is fatal for startup.
    pub async fn ensure_directories(&self) -> Result<(), IngestError> {
        for dir in self.layout.all() {
            self.fs
                .create_dir_all(dir)
                .await
                .map_err(|source| IngestError::Startup {
                    path: dir.to_path_buf(),
                    source,
                })?;
            debug!("Directory ready: {}", dir.display());
        }
        Ok(())
    }

    /// Move files left in `processing/` by an aborted run back to `incoming/`.
    ///
    /// Returns how many files were recovered.
    pub async fn recover_stranded(&self) -> Result<usize, IngestError> {
        let stranded = self.fs.list_files(&self.layout.processing).await?;
        let mut recovered = 0;

        for file in stranded {
            match self
                .transition(&file, ProcessingState::Processing, ProcessingState::Incoming, None)
                .await
            {
                Ok(_) => {
                    recovered += 1;
                    info!("Recovered stranded file {}", file.display());
                },
                Err(e) => warn!("Could not recover stranded file {}: {}", file.display(), e),
            }
        }

        Ok(recovered)
    }

    /// Run one file through the pipeline. Returns true when it was archived.
    pub async fn process(&self, file: &Path) -> bool {
        let file_name = display_name(file);
        info!("Started processing file {}", file_name);

        let final_state = match self
            .transition(file, ProcessingState::Incoming, ProcessingState::Processing, None)
            .await
        {
            Err(e) => {
                error!(file = %file_name, error = %e, "Could not claim file");
                ProcessingState::Incoming
            },
            Ok(claimed) => match self.parse_and_archive(&claimed, &file_name).await {
                Ok(()) => {
                    info!("Successfully processed file {}", file_name);
                    ProcessingState::Archived
                },
                Err(e @ IngestError::Interrupted(_)) => {
                    error!(file = %file_name, error = %e, "Processing interrupted");
                    ProcessingState::Processing
                },
                Err(e) => {
                    error!(file = %file_name, error = %e, "Error processing file");
                    self.quarantine(&claimed, &file_name, &e).await
                },
            },
        };

        let success = final_state == ProcessingState::Archived;
        let total_processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.publish(FileProcessedEvent {
            file_name,
            success,
            total_processed,
            final_state,
        });

        success
    }

    async fn parse_and_archive(&self, claimed: &Path, file_name: &str) -> Result<(), IngestError> {
        let content = self.fs.read(claimed).await?;
        let interchange = self.parser.parse_bytes(&content)?;
        info!("Processed file {}, {}", file_name, interchange.summary());

        self.transition(claimed, ProcessingState::Processing, ProcessingState::Archived, None)
            .await?;
        Ok(())
    }

    /// Move a claimed file into `errors/` under a timestamped name and write
    /// its `.log`. Returns the state the file ended in.
    async fn quarantine(&self, claimed: &Path, file_name: &str, cause: &IngestError) -> ProcessingState {
        let now = Local::now();
        let (error_name, log_name) = error_file_names(file_name, &now);

        if let Err(e) = self
            .transition(
                claimed,
                ProcessingState::Processing,
                ProcessingState::Errored,
                Some(&error_name),
            )
            .await
        {
            error!("Failed to move error file {}: {}", claimed.display(), e);
            return ProcessingState::Processing;
        }

        let log_path = self.layout.errors.join(log_name);
        let report = format!(
            "File: {}\nTimestamp: {}\nError: {}\n",
            file_name,
            now.format("%Y-%m-%dT%H:%M:%S%.3f"),
            cause
        );
        if let Err(e) = self.fs.write(&log_path, report.as_bytes()).await {
            error!("Failed to write error log {}: {}", log_path.display(), e);
        }

        ProcessingState::Errored
    }

    /// Checked state change: moves `file` into the directory of `to`, keeping
    /// its name unless `rename_to` is given.
    async fn transition(
        &self,
        file: &Path,
        from: ProcessingState,
        to: ProcessingState,
        rename_to: Option<&str>,
    ) -> Result<PathBuf, IngestError> {
        if !from.can_transition_to(to) {
            return Err(IngestError::IllegalTransition { from, to });
        }

        let name = match rename_to {
            Some(name) => name.into(),
            None => file
                .file_name()
                .map(|n| n.to_os_string())
                .ok_or_else(|| IngestError::Io(std::io::Error::other("path has no file name")))?,
        };
        let target = self.layout.dir_for(to).join(name);

        debug!("{} -> {}: {}", from, to, file.display());
        self.move_with_retry(file, &target).await?;
        Ok(target)
    }

    /// Move `from` to `to`, replacing any file already at `to`.
    ///
    /// The destination's parent is created first. Up to `attempts` renames are
    /// tried with `delay` between them; the last I/O error is returned once
    /// they are exhausted. An abort during the pause yields
    /// [`IngestError::Interrupted`].
    pub async fn move_with_retry(&self, from: &Path, to: &Path) -> Result<(), IngestError> {
        if let Some(parent) = to.parent() {
            self.fs.create_dir_all(parent).await?;
        }

        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.fs.rename(from, to).await {
                Ok(()) => return Ok(()),
                Err(source) if attempt >= attempts => {
                    return Err(IngestError::Move {
                        from: from.to_path_buf(),
                        to: to.to_path_buf(),
                        attempts,
                        source,
                    });
                },
                Err(e) => {
                    warn!(
                        "Attempt {}/{} to move file {} failed: {}",
                        attempt,
                        attempts,
                        from.display(),
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = self.abort.cancelled() => {
                            return Err(IngestError::Interrupted(format!(
                                "retrying move of {}",
                                from.display()
                            )));
                        },
                        _ = tokio::time::sleep(self.retry.delay) => {},
                    }
                    attempt += 1;
                },
            }
        }
    }
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

/// `<stem>_ERROR_<yyyyMMdd_HHmmss><.ext>` and its `<stem>_ERROR_<ts>.log`
fn error_file_names(file_name: &str, now: &DateTime<Local>) -> (String, String) {
    let (stem, extension) = match file_name.rfind('.') {
        Some(dot) => file_name.split_at(dot),
        None => (file_name, ""),
    };
    let tagged = format!("{}{}{}", stem, ERROR_MARKER, now.format(ERROR_TIMESTAMP_FORMAT));

    (format!("{}{}", tagged, extension), format!("{}.log", tagged))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_error_file_names_keep_extension() {
        let now = Local.with_ymd_and_hms(2025, 1, 15, 9, 30, 5).unwrap();
        let (moved, log) = error_file_names("850_order.edi", &now);
        assert_eq!(moved, "850_order_ERROR_20250115_093005.edi");
        assert_eq!(log, "850_order_ERROR_20250115_093005.log");
    }

    #[test]
    fn test_error_file_names_without_extension() {
        let now = Local.with_ymd_and_hms(2025, 1, 15, 9, 30, 5).unwrap();
        let (moved, log) = error_file_names("INBOUND", &now);
        assert_eq!(moved, "INBOUND_ERROR_20250115_093005");
        assert_eq!(log, "INBOUND_ERROR_20250115_093005.log");
    }

    #[test]
    fn test_error_file_names_split_on_last_dot() {
        let now = Local.with_ymd_and_hms(2025, 1, 15, 9, 30, 5).unwrap();
        let (moved, _) = error_file_names("batch.2025.x12", &now);
        assert_eq!(moved, "batch.2025_ERROR_20250115_093005.x12");
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(1000));
    }
}

//! Drop-folder ingestion
//!
//! # Architecture
//!
//! - **state**: `ProcessingState`, the directory a file sits in
//! - **layout**: the four managed directories under one base
//! - **fs**: filesystem seam the pipeline moves files through
//! - **events**: processed-file notifications with a bounded subscriber list
//! - **pipeline**: claim, parse, archive or quarantine one file
//! - **watcher**: startup sweep, OS watch with polling fallback, debounce and
//!   worker pool dispatch

pub mod events;
pub mod fs;
pub mod layout;
pub mod pipeline;
pub mod state;
pub mod watcher;

pub use events::{EventBus, EventSubscription, FileProcessedEvent};
pub use fs::{FileSystem, TokioFileSystem};
pub use layout::DirectoryLayout;
pub use pipeline::{IngestionPipeline, RetryPolicy};
pub use state::ProcessingState;
pub use watcher::{DirectoryWatcher, WatcherOptions};

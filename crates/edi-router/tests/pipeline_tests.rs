//! Ingestion pipeline tests on scratch directories

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_retry, pipeline_with, FlakyFileSystem, TestDirs, NOT_EDI, VALID_850};
use edi_router::ingest::{
    EventBus, FileProcessedEvent, IngestionPipeline, ProcessingState, RetryPolicy, TokioFileSystem,
};
use edi_router::IngestError;
use regex::Regex;

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn test_valid_file_is_archived() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), Arc::new(TokioFileSystem));
    let mut events = pipeline.subscribe().unwrap();

    let file = dirs.drop_incoming("po_4471.edi", VALID_850);
    assert!(pipeline.process(&file).await);

    assert!(dirs.names_in(&dirs.layout.incoming).is_empty());
    assert!(dirs.names_in(&dirs.layout.processing).is_empty());
    assert_eq!(dirs.names_in(&dirs.layout.archive), vec!["po_4471.edi"]);
    assert!(dirs.names_in(&dirs.layout.errors).is_empty());

    assert_eq!(
        events.recv().await,
        Some(FileProcessedEvent {
            file_name: "po_4471.edi".to_string(),
            success: true,
            total_processed: 1,
            final_state: ProcessingState::Archived,
        })
    );
    assert_eq!(pipeline.total_processed(), 1);
}

#[tokio::test]
async fn test_archive_replaces_file_with_same_name() {
    let dirs = TestDirs::new();
    dirs.create_all();
    std::fs::write(dirs.layout.archive.join("po.edi"), "old").unwrap();
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), Arc::new(TokioFileSystem));

    let file = dirs.drop_incoming("po.edi", VALID_850);
    assert!(pipeline.process(&file).await);

    let archived = std::fs::read_to_string(dirs.layout.archive.join("po.edi")).unwrap();
    assert_eq!(archived, VALID_850);
}

#[tokio::test]
async fn test_counter_and_events_per_file() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), Arc::new(TokioFileSystem));
    let mut events = pipeline.subscribe().unwrap();

    let good = dirs.drop_incoming("a.edi", VALID_850);
    let bad = dirs.drop_incoming("b.csv", NOT_EDI);
    let good_again = dirs.drop_incoming("c.edi", VALID_850);

    assert!(pipeline.process(&good).await);
    assert!(!pipeline.process(&bad).await);
    assert!(pipeline.process(&good_again).await);
    assert_eq!(pipeline.total_processed(), 3);

    let mut seen = Vec::new();
    for _ in 0..3 {
        let event = events.recv().await.unwrap();
        seen.push((event.file_name, event.success, event.total_processed, event.final_state));
    }
    assert_eq!(
        seen,
        vec![
            ("a.edi".to_string(), true, 1, ProcessingState::Archived),
            ("b.csv".to_string(), false, 2, ProcessingState::Errored),
            ("c.edi".to_string(), true, 3, ProcessingState::Archived),
        ]
    );
}

// ============================================================================
// ERROR PATH
// ============================================================================

#[tokio::test]
async fn test_parse_failure_is_quarantined_with_log() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), Arc::new(TokioFileSystem));

    let file = dirs.drop_incoming("orders.csv", NOT_EDI);
    assert!(!pipeline.process(&file).await);

    assert!(dirs.names_in(&dirs.layout.incoming).is_empty());
    assert!(dirs.names_in(&dirs.layout.processing).is_empty());
    assert!(dirs.names_in(&dirs.layout.archive).is_empty());

    let errors = dirs.names_in(&dirs.layout.errors);
    assert_eq!(errors.len(), 2, "expected moved file plus log, got {:?}", errors);

    let moved = Regex::new(r"^orders_ERROR_\d{8}_\d{6}\.csv$").unwrap();
    let log = Regex::new(r"^orders_ERROR_\d{8}_\d{6}\.log$").unwrap();
    let moved_name = errors.iter().find(|n| moved.is_match(n)).expect("moved file");
    let log_name = errors.iter().find(|n| log.is_match(n)).expect("log file");

    // the moved file keeps its content
    let content = std::fs::read_to_string(dirs.layout.errors.join(moved_name)).unwrap();
    assert_eq!(content, NOT_EDI);

    let report = std::fs::read_to_string(dirs.layout.errors.join(log_name)).unwrap();
    assert!(report.contains("File: orders.csv"));
    assert!(report.contains("Timestamp: "));
    assert!(report.contains("Error: "));
    assert!(report.contains("No ISA segment found"));
}

#[tokio::test]
async fn test_claim_failure_leaves_file_in_incoming() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let fs = Arc::new(FlakyFileSystem::failing_first(u32::MAX));
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), fs.clone());
    let mut events = pipeline.subscribe().unwrap();

    let file = dirs.drop_incoming("locked.edi", VALID_850);
    assert!(!pipeline.process(&file).await);

    assert_eq!(fs.rename_calls(), 3);
    assert_eq!(dirs.names_in(&dirs.layout.incoming), vec!["locked.edi"]);
    assert!(dirs.names_in(&dirs.layout.errors).is_empty());

    let event = events.recv().await.unwrap();
    assert!(!event.success);
    assert_eq!(event.final_state, ProcessingState::Incoming);
    assert_eq!(pipeline.total_processed(), 1);
}

#[tokio::test]
async fn test_transient_rename_failures_are_retried() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let fs = Arc::new(FlakyFileSystem::failing_first(2));
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), fs.clone());

    let file = dirs.drop_incoming("po.edi", VALID_850);
    assert!(pipeline.process(&file).await);

    // three attempts to claim, one to archive
    assert_eq!(fs.rename_calls(), 4);
    assert_eq!(dirs.names_in(&dirs.layout.archive), vec!["po.edi"]);
}

#[tokio::test]
async fn test_move_gives_up_after_configured_attempts() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let fs = Arc::new(FlakyFileSystem::failing_first(u32::MAX));
    let retry = RetryPolicy {
        attempts: 5,
        delay: Duration::ZERO,
    };
    let pipeline = pipeline_with(dirs.layout.clone(), retry, fs.clone());

    let file = dirs.drop_incoming("po.edi", VALID_850);
    let target = dirs.layout.archive.join("po.edi");
    let err = pipeline.move_with_retry(&file, &target).await.unwrap_err();

    assert_eq!(fs.rename_calls(), 5);
    assert!(matches!(err, IngestError::Move { attempts: 5, .. }));
    assert!(err.kind().is_retryable());
}

#[tokio::test]
async fn test_move_creates_destination_parent() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), Arc::new(TokioFileSystem));

    let file = dirs.drop_incoming("po.edi", VALID_850);
    let target = dirs.base.join("nested").join("deeper").join("po.edi");
    pipeline.move_with_retry(&file, &target).await.unwrap();

    assert!(target.is_file());
    assert!(!file.exists());
}

// ============================================================================
// ABORT
// ============================================================================

#[tokio::test]
async fn test_abort_interrupts_retry_sleep() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let fs = Arc::new(FlakyFileSystem::failing_first(u32::MAX));
    let retry = RetryPolicy {
        attempts: 3,
        delay: Duration::from_secs(60),
    };
    let pipeline = pipeline_with(dirs.layout.clone(), retry, fs.clone());
    pipeline.abort();
    assert!(pipeline.is_aborted());

    let file = dirs.drop_incoming("po.edi", VALID_850);
    let target = dirs.layout.processing.join("po.edi");
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.move_with_retry(&file, &target),
    )
    .await
    .expect("abort should cut the retry sleep short");

    assert!(matches!(result, Err(IngestError::Interrupted(_))));
    assert_eq!(fs.rename_calls(), 1);
}

#[tokio::test]
async fn test_interrupted_file_stays_in_processing() {
    let dirs = TestDirs::new();
    dirs.create_all();
    let fs = Arc::new(FlakyFileSystem::blocking(dirs.layout.archive.clone()));
    let retry = RetryPolicy {
        attempts: 3,
        delay: Duration::from_secs(60),
    };
    let pipeline = pipeline_with(dirs.layout.clone(), retry, fs);
    let mut events = pipeline.subscribe().unwrap();
    pipeline.abort();

    let file = dirs.drop_incoming("po.edi", VALID_850);
    assert!(!pipeline.process(&file).await);

    assert_eq!(dirs.names_in(&dirs.layout.processing), vec!["po.edi"]);
    assert!(dirs.names_in(&dirs.layout.errors).is_empty());

    let event = events.recv().await.unwrap();
    assert_eq!(event.final_state, ProcessingState::Processing);
    assert!(!event.success);
}

// ============================================================================
// STARTUP
// ============================================================================

#[tokio::test]
async fn test_ensure_directories_creates_layout() {
    let dirs = TestDirs::new();
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), Arc::new(TokioFileSystem));

    pipeline.ensure_directories().await.unwrap();
    for dir in dirs.layout.all() {
        assert!(dir.is_dir(), "{} missing", dir.display());
    }
}

#[tokio::test]
async fn test_ensure_directories_fails_when_base_is_a_file() {
    let dirs = TestDirs::new();
    let base = dirs.base.join("not-a-dir");
    std::fs::write(&base, "x").unwrap();
    let pipeline = Arc::new(IngestionPipeline::new(
        edi_router::ingest::DirectoryLayout::under(&base),
        fast_retry(),
        EventBus::new(1),
    ));

    let err = pipeline.ensure_directories().await.unwrap_err();
    assert!(matches!(err, IngestError::Startup { .. }));
}

#[tokio::test]
async fn test_recover_stranded_files() {
    let dirs = TestDirs::new();
    dirs.create_all();
    std::fs::write(dirs.layout.processing.join("left_over.edi"), VALID_850).unwrap();
    let pipeline = pipeline_with(dirs.layout.clone(), fast_retry(), Arc::new(TokioFileSystem));

    assert_eq!(pipeline.recover_stranded().await.unwrap(), 1);
    assert_eq!(dirs.names_in(&dirs.layout.incoming), vec!["left_over.edi"]);
    assert!(dirs.names_in(&dirs.layout.processing).is_empty());
}

// ============================================================================
// SUBSCRIBERS
// ============================================================================

#[tokio::test]
async fn test_subscriber_limit() {
    let dirs = TestDirs::new();
    let pipeline = IngestionPipeline::new(dirs.layout.clone(), RetryPolicy::default(), EventBus::new(2));

    let first = pipeline.subscribe().unwrap();
    let _second = pipeline.subscribe().unwrap();
    assert!(matches!(pipeline.subscribe(), Err(IngestError::SubscriberLimit(2))));

    drop(first);
    assert!(pipeline.subscribe().is_ok());
}

//! Incoming directory watcher
//!
//! Startup creates the managed directories, optionally returns files
//! stranded in `processing/`, registers the OS watch and then sweeps files
//! already waiting in `incoming/`. After that a blocking loop collects
//! create/modify events, debounces them per path and pushes settled files
//! into a bounded queue drained by a pool of workers. The loop never waits
//! on processing; a full queue just keeps the path pending.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::IngestionPipeline;
use crate::error::IngestError;

/// Default quiet period before a written file is dispatched (in milliseconds)
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Default scan interval of the polling fallback (in milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

pub const DEFAULT_WORKER_COUNT: usize = 4;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Upper bound on one blocking wait, so the running flag is seen promptly
const MAX_WAIT: Duration = Duration::from_millis(100);

/// Pause before offering a backlogged path to a full queue again
const BACKLOG_RETRY: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    /// Skip the native backend and always poll
    pub force_polling: bool,
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// Re-enqueue everything in `incoming/` when the backend reports lost events
    pub resync_on_overflow: bool,
    /// Move files found in `processing/` back to `incoming/` at startup
    pub recover_processing: bool,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            force_polling: false,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            resync_on_overflow: true,
            recover_processing: true,
        }
    }
}

type InFlight = Arc<Mutex<HashSet<PathBuf>>>;

pub struct DirectoryWatcher {
    pipeline: Arc<IngestionPipeline>,
    options: WatcherOptions,
    running: Arc<AtomicBool>,
}

impl DirectoryWatcher {
    pub fn new(pipeline: Arc<IngestionPipeline>, options: WatcherOptions) -> Self {
        Self {
            pipeline,
            options,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the watch loop to exit at its next iteration.
    ///
    /// Files already handed to a worker finish; queued ones stay in
    /// `incoming/` for the next startup sweep.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("Stopping directory watcher");
        }
    }

    /// Run until [`stop`](Self::stop) is called.
    ///
    /// Fails immediately if the managed directories cannot be created or
    /// the watcher is already running.
    pub async fn run(&self) -> Result<(), IngestError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(IngestError::AlreadyRunning);
        }

        let result = self.run_until_stopped().await;
        self.running.store(false, Ordering::Release);
        result
    }

    async fn run_until_stopped(&self) -> Result<(), IngestError> {
        self.pipeline.ensure_directories().await?;

        if self.options.recover_processing {
            let recovered = self.pipeline.recover_stranded().await?;
            if recovered > 0 {
                info!("Moved {} stranded files back to incoming", recovered);
            }
        }

        let incoming = self.pipeline.layout().incoming.clone();

        // Registered before the sweep so nothing written during it is missed
        let (event_tx, event_rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
        let backend = start_backend(&incoming, &self.options, event_tx)?;

        let swept = self.sweep(&incoming).await?;
        info!("Startup sweep processed {} files", swept);

        let (work_tx, work_rx) = tokio::sync::mpsc::channel(self.options.queue_capacity.max(1));
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
        let workers = spawn_workers(
            &self.pipeline,
            work_rx,
            self.options.worker_count.max(1),
            &self.running,
            &in_flight,
        );

        let watch_loop = WatchLoop {
            events: event_rx,
            dispatch: work_tx,
            in_flight,
            incoming,
            running: Arc::clone(&self.running),
            settle_delay: self.options.settle_delay,
            resync_on_overflow: self.options.resync_on_overflow,
        };
        let outcome = tokio::task::spawn_blocking(move || watch_loop.run()).await;

        // Releases the OS watch handle
        drop(backend);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Ingest worker failed: {}", e);
            }
        }

        outcome.map_err(|e| {
            IngestError::Io(std::io::Error::other(format!("watch loop task failed: {}", e)))
        })?;
        info!("Directory watcher stopped");
        Ok(())
    }

    /// Process every regular file already waiting, one after another
    async fn sweep(&self, incoming: &Path) -> Result<usize, IngestError> {
        let mut entries = tokio::fs::read_dir(incoming).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut processed = 0;
        for file in files {
            if !self.is_running() {
                break;
            }
            self.pipeline.process(&file).await;
            processed += 1;
        }
        Ok(processed)
    }
}

fn start_backend(
    dir: &Path,
    options: &WatcherOptions,
    event_tx: std::sync::mpsc::Sender<notify::Result<Event>>,
) -> Result<Box<dyn Watcher + Send>, IngestError> {
    if !options.force_polling {
        match notify::recommended_watcher(event_tx.clone()) {
            Ok(mut watcher) => match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    info!("Watching {} for new files", dir.display());
                    return Ok(Box::new(watcher));
                },
                Err(e) => warn!("Native watch of {} failed, polling instead: {}", dir.display(), e),
            },
            Err(e) => warn!("Native file watcher unavailable, polling instead: {}", e),
        }
    }

    let config = notify::Config::default().with_poll_interval(options.poll_interval);
    let mut watcher = PollWatcher::new(event_tx, config)?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(
        "Polling {} for new files every {}ms",
        dir.display(),
        options.poll_interval.as_millis()
    );
    Ok(Box::new(watcher))
}

fn spawn_workers(
    pipeline: &Arc<IngestionPipeline>,
    receiver: tokio::sync::mpsc::Receiver<PathBuf>,
    count: usize,
    running: &Arc<AtomicBool>,
    in_flight: &InFlight,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

    (0..count)
        .map(|worker_id| {
            let receiver = Arc::clone(&receiver);
            let pipeline = Arc::clone(pipeline);
            let running = Arc::clone(running);
            let in_flight = Arc::clone(in_flight);

            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(path) = next else {
                        break;
                    };

                    if running.load(Ordering::Acquire) {
                        pipeline.process(&path).await;
                    } else {
                        debug!("Watcher stopped, leaving {} in incoming", path.display());
                    }

                    in_flight
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .remove(&path);
                }
                debug!("Ingest worker {} exiting", worker_id);
            })
        })
        .collect()
}

struct WatchLoop {
    events: Receiver<notify::Result<Event>>,
    dispatch: tokio::sync::mpsc::Sender<PathBuf>,
    in_flight: InFlight,
    incoming: PathBuf,
    running: Arc<AtomicBool>,
    settle_delay: Duration,
    resync_on_overflow: bool,
}

impl WatchLoop {
    fn run(self) {
        let mut pending = PendingFiles::default();

        while self.running.load(Ordering::Acquire) {
            let timeout = pending
                .next_wait(Instant::now(), self.settle_delay)
                .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT));

            match self.events.recv_timeout(timeout) {
                Ok(result) => self.absorb(result, &mut pending),
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Watch backend disconnected, stopping");
                    break;
                },
            }
            while let Ok(result) = self.events.try_recv() {
                self.absorb(result, &mut pending);
            }

            for path in pending.drain_ready(Instant::now(), self.settle_delay) {
                if !self.dispatch_one(path, &mut pending) {
                    return;
                }
            }
        }
    }

    fn absorb(&self, result: notify::Result<Event>, pending: &mut PendingFiles) {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                error!("File watcher error: {}", e);
                return;
            },
        };

        let now = Instant::now();
        if event.need_rescan() {
            warn!("Watch events for {} may have been lost", self.incoming.display());
            if self.resync_on_overflow {
                let files = regular_files(&self.incoming);
                info!("Resyncing {} files from {}", files.len(), self.incoming.display());
                for file in files {
                    pending.touch(file, now);
                }
            }
            return;
        }

        for path in relevant_paths(event) {
            pending.touch(path, now);
        }
    }

    /// Returns false once the workers are gone
    fn dispatch_one(&self, path: PathBuf, pending: &mut PendingFiles) -> bool {
        {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !in_flight.insert(path.clone()) {
                debug!("{} is still being processed, checking again later", path.display());
                pending.retry_later(path);
                return true;
            }
        }

        // checked after claiming the in-flight slot so a finished worker's move is visible
        if !is_readable_file(&path) {
            debug!("Skipping {}: no longer a readable file", path.display());
            self.release(&path);
            return true;
        }

        match self.dispatch.try_send(path) {
            Ok(()) => true,
            Err(TrySendError::Full(path)) => {
                debug!("Ingest queue full, keeping {} pending", path.display());
                self.release(&path);
                pending.retry_later(path);
                true
            },
            Err(TrySendError::Closed(path)) => {
                self.release(&path);
                false
            },
        }
    }

    fn release(&self, path: &Path) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path);
    }
}

/// Paths waiting for their settle delay to elapse
#[derive(Debug, Default)]
struct PendingFiles {
    last_seen: HashMap<PathBuf, Instant>,
    // settled paths the queue had no room for
    backlog: VecDeque<PathBuf>,
}

impl PendingFiles {
    /// Record activity on `path`, restarting its settle timer
    fn touch(&mut self, path: PathBuf, now: Instant) {
        self.last_seen.insert(path, now);
    }

    fn retry_later(&mut self, path: PathBuf) {
        self.backlog.push_back(path);
    }

    /// Time until the next path settles, if any is pending
    fn next_wait(&self, now: Instant, settle: Duration) -> Option<Duration> {
        if !self.backlog.is_empty() {
            return Some(BACKLOG_RETRY);
        }
        self.last_seen
            .values()
            .map(|seen| (*seen + settle).saturating_duration_since(now))
            .min()
    }

    /// Remove and return the backlog plus every path quiet for `settle`
    fn drain_ready(&mut self, now: Instant, settle: Duration) -> Vec<PathBuf> {
        let mut ready: Vec<PathBuf> = self.backlog.drain(..).collect();

        let mut settled: Vec<PathBuf> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= settle)
            .map(|(path, _)| path.clone())
            .collect();
        settled.sort();

        for path in settled {
            self.last_seen.remove(&path);
            if !ready.contains(&path) {
                ready.push(path);
            }
        }
        ready
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.last_seen.len() + self.backlog.len()
    }
}

/// Paths a create/modify event says were written into the watched directory
fn relevant_paths(event: Event) -> Vec<PathBuf> {
    let Event { kind, mut paths, .. } = event;
    match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => paths.pop().into_iter().collect(),
        EventKind::Create(_) | EventKind::Modify(_) => paths,
        _ => Vec::new(),
    }
}

fn is_readable_file(path: &Path) -> bool {
    let is_file = std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false);
    is_file && std::fs::File::open(path).is_ok()
}

fn regular_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect(),
        Err(e) => {
            error!("Cannot list {}: {}", dir.display(), e);
            Vec::new()
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    const SETTLE: Duration = Duration::from_millis(500);

    #[test]
    fn test_pending_waits_for_settle_delay() {
        let mut pending = PendingFiles::default();
        let start = Instant::now();
        pending.touch(PathBuf::from("/in/a.edi"), start);

        assert!(pending.drain_ready(start + Duration::from_millis(100), SETTLE).is_empty());
        let ready = pending.drain_ready(start + SETTLE, SETTLE);
        assert_eq!(ready, vec![PathBuf::from("/in/a.edi")]);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_repeated_events_restart_timer() {
        let mut pending = PendingFiles::default();
        let start = Instant::now();
        let path = PathBuf::from("/in/a.edi");
        pending.touch(path.clone(), start);
        pending.touch(path.clone(), start + Duration::from_millis(400));

        assert!(pending.drain_ready(start + SETTLE, SETTLE).is_empty());
        assert_eq!(
            pending.drain_ready(start + Duration::from_millis(900), SETTLE),
            vec![path]
        );
    }

    #[test]
    fn test_backlog_is_offered_again_soon() {
        let mut pending = PendingFiles::default();
        let now = Instant::now();
        pending.retry_later(PathBuf::from("/in/b.edi"));

        assert_eq!(pending.next_wait(now, SETTLE), Some(BACKLOG_RETRY));
        assert_eq!(pending.drain_ready(now, SETTLE), vec![PathBuf::from("/in/b.edi")]);
    }

    #[test]
    fn test_next_wait_counts_down() {
        let mut pending = PendingFiles::default();
        let start = Instant::now();
        assert_eq!(pending.next_wait(start, SETTLE), None);

        pending.touch(PathBuf::from("/in/a.edi"), start);
        assert_eq!(
            pending.next_wait(start + Duration::from_millis(200), SETTLE),
            Some(Duration::from_millis(300))
        );
    }

    #[test]
    fn test_relevant_paths() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path("/in/a.edi".into());
        assert_eq!(relevant_paths(create), vec![PathBuf::from("/in/a.edi")]);

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/in/a.edi".into());
        assert_eq!(relevant_paths(write).len(), 1);

        let moved_away = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path("/in/a.edi".into());
        assert!(relevant_paths(moved_away).is_empty());

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/in/a.tmp".into())
            .add_path("/in/a.edi".into());
        assert_eq!(relevant_paths(renamed), vec![PathBuf::from("/in/a.edi")]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/in/a.edi".into());
        assert!(relevant_paths(removed).is_empty());
    }

    fn watch_loop(incoming: &Path, resync_on_overflow: bool) -> WatchLoop {
        let (_events_tx, events) = std::sync::mpsc::channel();
        let (dispatch, _queue) = tokio::sync::mpsc::channel(4);
        WatchLoop {
            events,
            dispatch,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            incoming: incoming.to_path_buf(),
            running: Arc::new(AtomicBool::new(true)),
            settle_delay: SETTLE,
            resync_on_overflow,
        }
    }

    fn rescan_event() -> notify::Result<Event> {
        Ok(Event::new(EventKind::Other).set_flag(notify::event::Flag::Rescan))
    }

    #[test]
    fn test_rescan_requeues_incoming_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.edi"), "a").unwrap();
        std::fs::write(dir.path().join("b.edi"), "b").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let mut pending = PendingFiles::default();
        watch_loop(dir.path(), true).absorb(rescan_event(), &mut pending);

        assert_eq!(pending.len(), 2);
        let later = Instant::now() + SETTLE;
        assert_eq!(
            pending.drain_ready(later, SETTLE),
            vec![dir.path().join("a.edi"), dir.path().join("b.edi")]
        );
    }

    #[test]
    fn test_rescan_ignored_when_resync_disabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.edi"), "a").unwrap();
        std::fs::write(dir.path().join("b.edi"), "b").unwrap();

        let mut pending = PendingFiles::default();
        watch_loop(dir.path(), false).absorb(rescan_event(), &mut pending);

        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_default_options() {
        let options = WatcherOptions::default();
        assert_eq!(options.settle_delay, Duration::from_millis(500));
        assert_eq!(options.poll_interval, Duration::from_millis(5000));
        assert!(!options.force_polling);
        assert!(options.resync_on_overflow);
    }
}

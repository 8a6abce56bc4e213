//! Parallel traversal engine
//!
//! # Architecture
//!
//! ```text
//!  seeds ──► DirQueue (bounded channel + spillover + flusher)
//!               │
//!               ▼
//!          Dispatcher ──── semaphore(threads) ────┐
//!               │                                 │
//!               ▼                                 ▼
//!          Worker task per directory:   open ► readdir ► decode
//!               │                                 │
//!               ├── subdirectory ► DirQueue       │
//!               └── matching entry ► batch ► ResultStore
//!                                                 │
//!                                                 ▼
//!                            Aggregator ► writer pool ► output
//! ```
//!
//! Quiescence: every enqueue increments the in-flight counter, every worker
//! completion decrements it. The decrement that reaches zero wakes the
//! dispatcher, which exits and releases the result pipeline. Producers are
//! also consumers here, so no channel-closing handshake can be used — the
//! counter is the single source of truth.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::deadline;
use crate::dirent::{DirentIter, EntryKind, DECODE_BUF_LEN};
use crate::error::{FindError, Result};
use crate::output::{
    run_aggregator, OutputBuffer, RecordFormat, ResultRecord, ResultStore, BATCH_CAPACITY,
};
use crate::queue::{run_flusher, DirQueue, DirQueueParts};

/// Final counters from a traversal
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalStats {
    pub dirs_scanned: u64,
    pub entries_emitted: u64,
    pub errors: u64,
}

struct Shared {
    config: Config,
    queue: Arc<DirQueue>,
    store: Arc<ResultStore>,
    cancel: CancellationToken,
    dirs_done: Arc<AtomicBool>,
    dirs_scanned: AtomicU64,
    entries_emitted: AtomicU64,
    errors: AtomicU64,
}

/// The traversal engine: owns the queue, the worker pool and the result
/// pipeline for one run.
pub struct Explorer {
    shared: Arc<Shared>,
    parts: Option<DirQueueParts>,
    out: Arc<OutputBuffer>,
}

impl Explorer {
    /// Create an engine writing records to `sink`
    pub fn new(config: Config, sink: Box<dyn Write + Send>) -> Self {
        let (queue, parts) = DirQueue::new(config.threads, config.channel_capacity());
        let shared = Arc::new(Shared {
            config,
            queue,
            store: Arc::new(ResultStore::new()),
            cancel: CancellationToken::new(),
            dirs_done: Arc::new(AtomicBool::new(false)),
            dirs_scanned: AtomicU64::new(0),
            entries_emitted: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        });
        Self {
            shared,
            parts: Some(parts),
            out: Arc::new(OutputBuffer::new(sink)),
        }
    }

    /// Token cancelled by SIGINT handling; observed at every suspension point
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Add a seed directory. Must be called before `run`.
    pub fn seed(&self, dir: String) {
        self.shared.queue.enqueue(dir);
    }

    /// Drive the traversal to completion and return its counters.
    ///
    /// Resolves only after both the dispatcher and the result pipeline have
    /// terminated and the output buffer has been flushed.
    pub async fn run(mut self) -> TraversalStats {
        let parts = self.parts.take().expect("run called twice");

        if self.shared.queue.in_flight() == 0 {
            warn!("no seed directories, nothing to do");
            return TraversalStats::default();
        }

        let flusher = tokio::spawn(run_flusher(
            Arc::clone(&self.shared.queue),
            parts.flush,
        ));

        let aggregator = tokio::spawn(run_aggregator(
            Arc::clone(&self.shared.store),
            Arc::clone(&self.shared.dirs_done),
            Arc::new(RecordFormat::from_config(&self.shared.config)),
            Arc::clone(&self.out),
            self.shared.config.result_jobs,
        ));

        dispatch(Arc::clone(&self.shared), parts.dirs).await;

        // Directories are complete; let the aggregator drain and finish
        self.shared.dirs_done.store(true, Ordering::SeqCst);
        self.shared.store.wake();
        if let Err(e) = aggregator.await {
            error!("result pipeline failed: {}", e);
        }
        flusher.abort();

        let stats = TraversalStats {
            dirs_scanned: self.shared.dirs_scanned.load(Ordering::Relaxed),
            entries_emitted: self.shared.entries_emitted.load(Ordering::Relaxed),
            errors: self.shared.errors.load(Ordering::Relaxed),
        };
        debug!(
            "traversal done: {} dirs scanned, {} entries emitted, {} errors",
            stats.dirs_scanned, stats.entries_emitted, stats.errors
        );
        stats
    }
}

/// Pull directories off the channel and spawn a bounded worker for each.
///
/// Exits on quiescence (in-flight count reached zero) or cancellation.
async fn dispatch(shared: Arc<Shared>, mut dirs: mpsc::Receiver<String>) {
    let limiter = Arc::new(Semaphore::new(shared.config.threads));
    let mut workers: JoinSet<()> = JoinSet::new();
    let mut cancelled = false;

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                cancelled = true;
                break;
            }
            _ = shared.queue.quiesced() => break,
            dir = dirs.recv() => {
                let Some(dir) = dir else { break };
                let permit = Arc::clone(&limiter)
                    .acquire_owned()
                    .await
                    .expect("worker semaphore closed");
                let shared = Arc::clone(&shared);
                workers.spawn(async move {
                    if !shared.cancel.is_cancelled() {
                        scan_one(&shared, &dir).await;
                    }
                    drop(permit);
                    shared.queue.complete_one();
                });
                while workers.try_join_next().is_some() {}
            }
        }
    }

    if cancelled {
        drain_cancelled(&shared, &mut dirs).await;
    }
    while workers.join_next().await.is_some() {}
}

/// Turn all pending work into no-ops so the in-flight count converges to
/// zero while cancelled workers return promptly.
async fn drain_cancelled(shared: &Shared, dirs: &mut mpsc::Receiver<String>) {
    loop {
        let mut drained = false;
        while dirs.try_recv().is_ok() {
            shared.queue.complete_one();
            drained = true;
        }
        while shared.queue.pop_spillover().is_some() {
            shared.queue.complete_one();
            drained = true;
        }
        if shared.queue.in_flight() <= 0 {
            return;
        }
        if !drained {
            // Only executing workers remain; their completions finish the count
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }
}

/// Scan a single directory, routing errors through the resilience policy
async fn scan_one(shared: &Shared, dir: &str) {
    match read_directory(shared, dir).await {
        Ok(()) => {
            shared.dirs_scanned.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            shared.errors.fetch_add(1, Ordering::Relaxed);
            if err.is_fatal(shared.config.resilient) {
                error!("{}", err);
                std::process::exit(1);
            }
            warn!("{}", err);
        }
    }
}

/// Open, read and decode one directory, emitting matches and enqueuing
/// subdirectories
async fn read_directory(shared: &Shared, dir: &str) -> Result<()> {
    let timeout = shared.config.timeout;
    let handle = deadline::open_dir_with_deadline(dir.to_string(), timeout).await?;

    let mut buf = vec![0u8; DECODE_BUF_LEN];
    let mut batch: Vec<ResultRecord> = Vec::with_capacity(BATCH_CAPACITY);
    let now = unix_now();

    let outcome = loop {
        if shared.cancel.is_cancelled() {
            break Ok(());
        }
        let (len, returned) =
            match deadline::read_entries_with_deadline(Arc::clone(&handle), buf, timeout).await {
                Ok(pair) => pair,
                Err(err) => break Err(err),
            };
        buf = returned;
        if len == 0 {
            break Ok(());
        }

        if let Err(err) = process_buffer(shared, dir, &buf[..len], now, &mut batch) {
            break Err(err);
        }
    };

    // Partial results are emitted even when the directory aborts midway
    if !batch.is_empty() {
        shared.store.submit(batch);
    }
    outcome
}

/// Decode one filled buffer and run every entry through the filter chain
fn process_buffer(
    shared: &Shared,
    dir: &str,
    buf: &[u8],
    now: i64,
    batch: &mut Vec<ResultRecord>,
) -> Result<()> {
    let config = &shared.config;
    let times_needed = config.times_needed();

    for entry in DirentIter::new(buf, buf.len()) {
        // A 64 KiB buffer holds hundreds of records; cancellation must not
        // wait for the next read, and must stop further enqueues.
        if shared.cancel.is_cancelled() {
            return Ok(());
        }
        let entry = entry.map_err(|e| FindError::Decode {
            path: dir.to_string(),
            offset: e.offset,
            detail: e.detail,
        })?;

        let name = String::from_utf8_lossy(entry.name);
        let full_path = join_path(dir, &name);
        let is_dir = entry.kind.is_dir();

        // Recursion first: an include filter must not suppress descent.
        // Symlinks are never followed, so a link to a directory stays a leaf.
        if is_dir {
            shared.queue.enqueue(full_path.clone());
        }

        if config.path_filter.rejects(&full_path) {
            continue;
        }

        if !config.types.admits(entry.kind) {
            if matches!(
                entry.kind,
                EntryKind::CharDevice
                    | EntryKind::BlockDevice
                    | EntryKind::Fifo
                    | EntryKind::Unknown(_)
            ) {
                info!(
                    "Skipped record: {} iNode<{}>[type:{}]",
                    full_path, entry.ino, entry.kind
                );
            }
            continue;
        }

        let display_path = if is_dir {
            format!("{full_path}/")
        } else {
            full_path.clone()
        };

        let times = if times_needed {
            match crate::filter::stat_times(&full_path) {
                Ok(times) => {
                    if !config.time_windows.matches(&times, now) {
                        continue;
                    }
                    Some(times)
                }
                Err(source) => {
                    shared.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "{}",
                        FindError::Stat {
                            path: full_path,
                            source
                        }
                    );
                    continue;
                }
            }
        } else {
            None
        };

        batch.push(ResultRecord {
            path: display_path,
            ino: entry.ino,
            times,
        });
        shared.entries_emitted.fetch_add(1, Ordering::Relaxed);

        if batch.len() >= BATCH_CAPACITY {
            shared
                .store
                .submit(std::mem::replace(batch, Vec::with_capacity(BATCH_CAPACITY)));
        }
    }
    Ok(())
}

/// Join a parent directory and an entry name
fn join_path(dir: &str, name: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        return format!("/{name}");
    }
    if trimmed == "." {
        return name.to_string();
    }
    format!("{trimmed}/{name}")
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

//! Result pipeline: batching, writer pool and record formatting
//!
//! Workers accumulate matching entries into batches and push whole batches
//! into a global store. A single aggregator detaches the store whenever it
//! has content and hands each detachment to a writer drawn from a bounded
//! pool. Writers format records into a shared output buffer under its lock,
//! flushing to the sink past a small threshold, and perform the optional
//! per-record side effects (size lstat, delete).
//!
//! Ordering: records within one detachment stay in order; across writers no
//! ordering is promised.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::FindError;
use crate::filter::EntryTimes;

/// Maximum records per worker batch before it is submitted
pub const BATCH_CAPACITY: usize = 1024;

/// Flush the output buffer once it grows past this
const FLUSH_THRESHOLD: usize = 4 * 1024;

/// How long the aggregator waits for a wakeup before re-checking state
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One matched entry, ready for formatting
#[derive(Debug, Clone)]
pub struct ResultRecord {
    /// Full path; directories carry a trailing separator
    pub path: String,
    pub ino: u64,
    /// Populated when a time window or --with-times required a stat
    pub times: Option<EntryTimes>,
}

/// Global list of pending results, filled by workers in whole batches
#[derive(Default)]
pub struct ResultStore {
    records: Mutex<Vec<ResultRecord>>,
    notify: Notify,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a worker batch and wake the aggregator
    pub fn submit(&self, batch: Vec<ResultRecord>) {
        if batch.is_empty() {
            return;
        }
        self.records.lock().extend(batch);
        self.notify.notify_one();
    }

    /// Detach everything currently in the store
    pub fn take_all(&self) -> Vec<ResultRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Wake the aggregator without new data (used when traversal finishes)
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}

/// Per-record output options, copied out of the run configuration
#[derive(Debug, Clone)]
pub struct RecordFormat {
    pub inodes: bool,
    pub inodes_hex: bool,
    pub raw: bool,
    pub with_sizes: bool,
    pub with_times: bool,
    pub delete: bool,
    pub delete_all: bool,
}

impl RecordFormat {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inodes: config.inodes,
            inodes_hex: config.inodes_hex,
            raw: config.raw,
            with_sizes: config.with_sizes,
            with_times: config.with_times,
            delete: config.delete,
            delete_all: config.delete_all,
        }
    }
}

struct OutputState {
    buf: String,
    sink: Box<dyn Write + Send>,
}

/// Shared, lock-guarded output buffer in front of the sink
pub struct OutputBuffer {
    state: Mutex<OutputState>,
}

impl OutputBuffer {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(OutputState {
                buf: String::with_capacity(2 * FLUSH_THRESHOLD),
                sink,
            }),
        }
    }

    /// Flush any buffered output to the sink
    pub fn flush(&self) {
        let mut state = self.state.lock();
        flush_locked(&mut state);
    }
}

fn flush_locked(state: &mut OutputState) {
    if state.buf.is_empty() {
        return;
    }
    if let Err(e) = state.sink.write_all(state.buf.as_bytes()) {
        warn!("output write failed: {}", e);
    }
    if let Err(e) = state.sink.flush() {
        warn!("output flush failed: {}", e);
    }
    state.buf.clear();
}

/// Format and emit one detached batch. Runs on the blocking pool; holds the
/// output lock for the whole batch so its records stay contiguous.
pub fn write_records(records: Vec<ResultRecord>, format: &RecordFormat, out: &OutputBuffer) {
    let mut state = out.state.lock();
    for record in records {
        if format.raw {
            let _ = write!(state.buf, "{:?}", record.path);
        } else {
            state.buf.push_str(&record.path);
        }
        if format.inodes {
            let _ = write!(state.buf, " {}", record.ino);
        }
        if format.inodes_hex {
            let _ = write!(state.buf, " 0x{:x}", record.ino);
        }
        if format.with_sizes {
            match std::fs::symlink_metadata(&record.path) {
                Ok(meta) => {
                    let _ = write!(state.buf, " {}", meta.len());
                }
                Err(e) => {
                    warn!("{}: lstat: {}", record.path, e);
                    state.buf.push_str(" 0");
                }
            }
        }
        if format.with_times {
            let times = record.times.unwrap_or(EntryTimes {
                atime: 0,
                mtime: 0,
                ctime: 0,
            });
            let _ = write!(
                state.buf,
                " {} {} {}",
                times.atime, times.mtime, times.ctime
            );
        }
        if format.delete || format.delete_all {
            let outcome = if format.delete_all {
                remove_recursive(&record.path)
            } else {
                remove_single(&record.path)
            };
            match outcome {
                Ok(()) => {
                    info!("Delete success: {}", record.path);
                    state.buf.push_str(" [delete_success]");
                }
                Err(source) => {
                    warn!(
                        "{}",
                        FindError::Delete {
                            path: record.path.clone(),
                            source
                        }
                    );
                    state.buf.push_str(" [delete_failed]");
                }
            }
        }
        state.buf.push('\n');

        if state.buf.len() > FLUSH_THRESHOLD {
            flush_locked(&mut state);
        }
    }
}

/// Remove a single entry; a directory must be empty. Directory records are
/// recognized by their trailing separator.
fn remove_single(path: &str) -> std::io::Result<()> {
    if path.ends_with('/') {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Remove an entry and, for directories, everything beneath it
fn remove_recursive(path: &str) -> std::io::Result<()> {
    if path.ends_with('/') {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Watch the store and fan detached batches out to bounded writers.
///
/// Exits when `dirs_done` is set and the store is empty, then joins every
/// outstanding writer and performs the final flush.
pub async fn run_aggregator(
    store: Arc<ResultStore>,
    dirs_done: Arc<AtomicBool>,
    format: Arc<RecordFormat>,
    out: Arc<OutputBuffer>,
    result_jobs: usize,
) {
    let writers = Arc::new(Semaphore::new(result_jobs));
    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        let batch = store.take_all();
        if !batch.is_empty() {
            let permit = Arc::clone(&writers)
                .acquire_owned()
                .await
                .expect("writer semaphore closed");
            let format = Arc::clone(&format);
            let out = Arc::clone(&out);
            tasks.spawn_blocking(move || {
                write_records(batch, &format, &out);
                drop(permit);
            });
            // Opportunistically reap finished writers
            while tasks.try_join_next().is_some() {}
            continue;
        }

        // Register for a wakeup before re-checking so a submit between the
        // emptiness check and the wait is not lost.
        let wake = store.notify.notified();
        if dirs_done.load(Ordering::SeqCst) && store.is_empty() {
            break;
        }
        let _ = tokio::time::timeout(POLL_INTERVAL, wake).await;
    }

    while tasks.join_next().await.is_some() {}
    out.flush();
}

//! Work queue with spillover support
//!
//! Directories to scan flow through a bounded channel. Workers enqueue the
//! subdirectories they discover, so a blocking send could deadlock the pool:
//! every worker stuck sending while nobody dequeues. Enqueue therefore never
//! blocks — on a full channel the path is parked in an unbounded spillover
//! list, and a flusher task drains spillover back into the channel whenever
//! capacity frees up.
//!
//! The queue also carries the traversal's in-flight accounting: the counter
//! goes up on enqueue and down on worker completion, and hitting zero is the
//! quiescence signal. Invariant: channel length + spillover length +
//! executing workers = in-flight count.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::debug;

/// How often the flusher drains spillover without an explicit request
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Bounded directory channel plus unbounded spillover
pub struct DirQueue {
    tx: mpsc::Sender<String>,
    spillover: Mutex<Vec<String>>,
    in_flight: AtomicI64,
    flush_tx: mpsc::Sender<()>,
    quiesced: Notify,
    threads: usize,
}

/// The receiving ends of a `DirQueue`, held by the dispatcher and flusher
pub struct DirQueueParts {
    pub dirs: mpsc::Receiver<String>,
    pub flush: mpsc::Receiver<()>,
}

impl DirQueue {
    /// Create a queue sized for `threads` workers with the given channel
    /// capacity
    pub fn new(threads: usize, capacity: usize) -> (Arc<Self>, DirQueueParts) {
        let (tx, dirs) = mpsc::channel(capacity);
        let (flush_tx, flush) = mpsc::channel(1);

        let queue = Arc::new(Self {
            tx,
            spillover: Mutex::new(Vec::new()),
            in_flight: AtomicI64::new(0),
            flush_tx,
            quiesced: Notify::new(),
            threads,
        });

        (queue, DirQueueParts { dirs, flush })
    }

    /// Enqueue a directory for traversal. Never blocks.
    ///
    /// The in-flight counter is incremented before the send so a worker
    /// completing concurrently cannot observe a spurious zero.
    pub fn enqueue(&self, dir: String) {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        match self.tx.try_send(dir) {
            Ok(()) => {}
            Err(TrySendError::Full(dir)) => {
                let mut spill = self.spillover.lock();
                spill.push(dir);
                // Workers are about to starve on non-spillover work; ask the
                // flusher to run now instead of on its next tick. A full
                // request slot means one is already pending.
                if in_flight - (spill.len() as i64) < self.threads as i64 {
                    let _ = self.flush_tx.try_send(());
                }
            }
            Err(TrySendError::Closed(_)) => {
                // Dispatcher already exited (cancellation drain); the job
                // will never run, so take it back out of the accounting.
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Record completion of one directory job. Returns true exactly when
    /// this completion empties the traversal.
    pub fn complete_one(&self) -> bool {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.quiesced.notify_one();
            return true;
        }
        false
    }

    /// Outstanding directory jobs (queued, spilled or executing)
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once the in-flight count has reached zero
    pub async fn quiesced(&self) {
        self.quiesced.notified().await;
    }

    /// Pop one spilled path (LIFO)
    pub fn pop_spillover(&self) -> Option<String> {
        self.spillover.lock().pop()
    }

    /// Number of spilled paths
    pub fn spillover_len(&self) -> usize {
        self.spillover.lock().len()
    }

    fn try_send(&self, dir: String) -> Result<(), TrySendError<String>> {
        self.tx.try_send(dir)
    }
}

/// Drain spillover into the channel on request or every FLUSH_INTERVAL.
///
/// Runs until aborted; the explorer stops it after quiescence.
pub async fn run_flusher(queue: Arc<DirQueue>, mut flush_rx: mpsc::Receiver<()>) {
    loop {
        tokio::select! {
            request = flush_rx.recv() => {
                if request.is_none() {
                    return;
                }
            }
            _ = tokio::time::sleep(FLUSH_INTERVAL) => {}
        }

        let mut flushed = 0usize;
        while let Some(dir) = queue.pop_spillover() {
            match queue.try_send(dir) {
                Ok(()) => flushed += 1,
                Err(TrySendError::Full(dir)) => {
                    // Channel filled back up; park it again for the next round
                    queue.spillover.lock().push(dir);
                    break;
                }
                Err(TrySendError::Closed(_)) => {
                    queue.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        if flushed > 0 {
            debug!("flushed {} spilled directories into the channel", flushed);
        }
    }
}

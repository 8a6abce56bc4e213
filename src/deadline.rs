//! Deadline-bounded syscall wrappers
//!
//! On some network filesystem mount states a blocked open or readdir is not
//! interruptible. Each wrapper here runs the syscall on the blocking pool and
//! races it against a timer; when the timer wins, the helper is detached and
//! never joined — its OS thread may stay blocked on the stuck syscall
//! indefinitely. Leaking one helper is preferable to hanging the whole
//! traversal. Helpers own nothing but their fd clone and decode buffer, and
//! their creation rate is bounded by the worker pool (one outstanding helper
//! per worker).

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::dirent::DirHandle;
use crate::error::{FindError, Result};

/// Operation name reported when an open stalls
pub const OP_OPEN: &str = "dir open";

/// Operation name reported when a directory read stalls
pub const OP_READDIR: &str = "readdir";

/// Race a blocking operation against a deadline.
///
/// Returns the operation's own result, or `FindError::Timeout` when the
/// deadline elapses first. The helper task is intentionally left running
/// after a timeout.
pub async fn run_with_deadline<T, F>(
    op: &'static str,
    path: &str,
    timeout: Duration,
    f: F,
) -> Result<io::Result<T>>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let helper = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(timeout, helper).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(join_err)) => panic!("deadline helper panicked: {join_err}"),
        Err(_elapsed) => Err(FindError::Timeout {
            op,
            path: path.to_string(),
        }),
    }
}

/// Open a directory, bounded by `timeout`
pub async fn open_dir_with_deadline(path: String, timeout: Duration) -> Result<Arc<DirHandle>> {
    let open_path = path.clone();
    run_with_deadline(OP_OPEN, &path, timeout, move || DirHandle::open(&open_path))
        .await?
        .map(Arc::new)
        .map_err(|source| FindError::Open { path, source })
}

/// Read raw entries into `buf`, bounded by `timeout`.
///
/// The buffer moves through the helper and comes back on success; on timeout
/// it is abandoned along with the helper (which may still be writing into
/// it), so the caller must start over with a fresh buffer if it retries.
pub async fn read_entries_with_deadline(
    handle: Arc<DirHandle>,
    mut buf: Vec<u8>,
    timeout: Duration,
) -> Result<(usize, Vec<u8>)> {
    let path = handle.path().to_string();
    run_with_deadline(OP_READDIR, &path, timeout, move || {
        let n = handle.read_entries(&mut buf)?;
        Ok((n, buf))
    })
    .await?
    .map_err(|source| FindError::ReadDir { path, source })
}

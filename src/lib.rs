//! parfind - Massively Parallel Directory Traversal
//!
//! A find-style traversal engine for very large trees on high-latency
//! filesystems (NFS and friends), where single-threaded tools are limited by
//! per-directory round-trip latency rather than CPU. parfind issues many
//! directory reads concurrently behind a bounded worker budget, typically
//! cutting aggregate walk time on remote trees by an order of magnitude or
//! more.
//!
//! # Features
//!
//! - **Raw directory reads**: decodes `getdents64` buffers directly, so an
//!   entry's inode and type come straight from the kernel stream with no
//!   extra stat.
//!
//! - **Deadline-bounded syscalls**: every open and readdir races a timer; a
//!   stuck NFS mount costs one leaked helper thread, never the traversal.
//!
//! - **Backpressure without deadlock**: workers enqueue discovered
//!   subdirectories through a never-blocking path (bounded channel with
//!   unbounded spillover), so unbounded fan-out runs on a fixed pool.
//!
//! - **Filtering**: include/exclude globs, entry-type sets and
//!   atime/mtime/ctime window predicates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Work Queue                              │
//! │        bounded channel ◄── flusher ◄── spillover             │
//! └───────────────┬──────────────────────────────────────────────┘
//!                 │
//!                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Dispatcher                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐       ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...  │Worker N │     │
//! │  │getdents │  │getdents │  │getdents │       │getdents │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘       └────┬────┘     │
//! │       │ subdirs back to the queue; matches forward │         │
//! └───────┼────────────┼────────────┼─────────────────┼──────────┘
//!         ▼            ▼            ▼                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │            Result Store ► Aggregator ► Writer Pool           │
//! │                 (stdout, one record per line)                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # All regular files under /mnt/share, 256 concurrent readers
//! parfind -j 256 -t file /mnt/share
//!
//! # Stale logs older than 30 days, with sizes
//! parfind -t file -f '**/*.log' --mtime-older 720h --with-size /mnt/share
//! ```

pub mod config;
pub mod deadline;
pub mod dirent;
pub mod error;
pub mod filter;
pub mod output;
pub mod queue;
pub mod walker;

pub use config::{CliArgs, Config};
pub use error::{FindError, Result};
pub use walker::{Explorer, TraversalStats};

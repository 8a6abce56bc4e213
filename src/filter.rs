//! Name/path and time-window filtering
//!
//! Two predicates run over every discovered entry, in order:
//!
//! 1. Path filter: if any includes are configured the path must match at
//!    least one; any exclude match rejects. A directory rejected here is
//!    still traversed — filtering decides emission only.
//! 2. Time filter: only evaluated when a time window is enabled (or times
//!    are requested for output). Requires a stat of the full path.

use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::os::unix::fs::MetadataExt;

use crate::error::{FindError, Result};

/// Compiled include/exclude glob sets, matched against full paths
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    includes: GlobSet,
    excludes: GlobSet,
    have_includes: bool,
}

impl PathFilter {
    /// Compile include and exclude pattern lists
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self> {
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
            have_includes: !includes.is_empty(),
        })
    }

    /// True when includes are configured and none of them match
    pub fn omitted_by_includes(&self, path: &str) -> bool {
        self.have_includes && !self.includes.is_match(path)
    }

    /// True when any exclude pattern matches
    pub fn excluded(&self, path: &str) -> bool {
        self.excludes.is_match(path)
    }

    /// Combined emission decision: rejected by includes or by excludes
    pub fn rejects(&self, path: &str) -> bool {
        self.omitted_by_includes(path) || self.excluded(path)
    }
}

fn compile(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| FindError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| FindError::Pattern {
        pattern: String::new(),
        reason: e.to_string(),
    })
}

/// atime/mtime/ctime of an entry, as unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTimes {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// Stat a path for its three timestamps. Follows symlinks.
pub fn stat_times(path: &str) -> std::io::Result<EntryTimes> {
    let meta = std::fs::metadata(path)?;
    Ok(EntryTimes {
        atime: meta.atime(),
        mtime: meta.mtime(),
        ctime: meta.ctime(),
    })
}

/// The six time-window predicates (atime/mtime/ctime x older/newer).
///
/// A zero duration disables its predicate. `older` passes iff the timestamp
/// is at or before `now - duration`; `newer` iff at or after. Both bounds
/// are inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindows {
    pub atime_older: Duration,
    pub atime_newer: Duration,
    pub mtime_older: Duration,
    pub mtime_newer: Duration,
    pub ctime_older: Duration,
    pub ctime_newer: Duration,
}

impl TimeWindows {
    /// Whether any predicate is enabled
    pub fn any_enabled(&self) -> bool {
        !(self.atime_older.is_zero()
            && self.atime_newer.is_zero()
            && self.mtime_older.is_zero()
            && self.mtime_newer.is_zero()
            && self.ctime_older.is_zero()
            && self.ctime_newer.is_zero())
    }

    /// Evaluate every enabled predicate against the entry's timestamps.
    /// `now` is unix seconds.
    pub fn matches(&self, times: &EntryTimes, now: i64) -> bool {
        window_ok(times.atime, self.atime_older, self.atime_newer, now)
            && window_ok(times.mtime, self.mtime_older, self.mtime_newer, now)
            && window_ok(times.ctime, self.ctime_older, self.ctime_newer, now)
    }
}

fn window_ok(ts: i64, older: Duration, newer: Duration, now: i64) -> bool {
    if !older.is_zero() && ts > now - older.as_secs() as i64 {
        return false;
    }
    if !newer.is_zero() && ts < now - newer.as_secs() as i64 {
        return false;
    }
    true
}

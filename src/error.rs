//! Error types for parfind
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Every error carries the path of the unit it refers to, so a diagnostic
//!   line is self-contained
//! - Fatality is a policy decision (resilient vs stop-on-error), not a
//!   property of the error alone

use thiserror::Error;

/// Top-level error type for the parfind engine
#[derive(Error, Debug)]
pub enum FindError {
    /// Opening a directory failed
    #[error("{path}: dir open: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// A raw directory read failed
    #[error("{path}: readdir: {source}")]
    ReadDir {
        path: String,
        source: std::io::Error,
    },

    /// A directory-entry buffer could not be decoded
    #[error("{path}: malformed directory entry at offset {offset}: {detail}")]
    Decode {
        path: String,
        offset: usize,
        detail: &'static str,
    },

    /// An open or readdir exceeded its deadline.
    ///
    /// `op` names the stalled operation ("dir open" or "readdir") so the
    /// diagnostic identifies which call hung.
    #[error("{path}: {op}: timed out")]
    Timeout { op: &'static str, path: String },

    /// A stat during time filtering failed
    #[error("{path}: stat: {source}")]
    Stat {
        path: String,
        source: std::io::Error,
    },

    /// A delete side effect failed
    #[error("Delete failed: {path} - Error: {source}")]
    Delete {
        path: String,
        source: std::io::Error,
    },

    /// An include/exclude pattern failed to compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// An unknown --type value
    #[error("Invalid type '{value}': expected file, dir, link, socket or all")]
    InvalidType { value: String },

    /// A seed path is not a directory
    #[error("{path}: not a directory")]
    NotADirectory { path: String },
}

impl FindError {
    /// Whether this error must abort the process under the given mode.
    ///
    /// In resilient mode nothing is fatal: the offending directory or entry
    /// is logged and skipped. With --stop-on-error, open/read/decode/timeout
    /// errors abort; stat and delete failures are always per-entry and
    /// always non-fatal.
    pub fn is_fatal(&self, resilient: bool) -> bool {
        if resilient {
            return false;
        }
        matches!(
            self,
            FindError::Open { .. }
                | FindError::ReadDir { .. }
                | FindError::Decode { .. }
                | FindError::Timeout { .. }
        )
    }
}

/// Result type alias for FindError
pub type Result<T> = std::result::Result<T, FindError>;

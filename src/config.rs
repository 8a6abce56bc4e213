//! Configuration types for parfind
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Go-style duration literal parsing ("24h5m25s")
//! - Runtime configuration with validated glob sets and type filters

use std::time::Duration;

use clap::Parser;

use crate::error::{FindError, Result};
use crate::dirent::EntryKind;
use crate::filter::{PathFilter, TimeWindows};

/// Minimum work channel capacity regardless of thread count
const MIN_CHANNEL_CAPACITY: usize = 4096;

/// Massively parallel find for large trees on high-latency filesystems
#[derive(Parser, Debug, Clone)]
#[command(
    name = "parfind",
    version,
    about = "Massively parallel find for large trees on high-latency filesystems",
    long_about = "Traverses directory trees with many concurrent readdir operations,\n\
                  designed for networked filesystems where per-directory latency,\n\
                  not CPU, limits throughput."
)]
pub struct CliArgs {
    /// Directories to search, using current directory if missing
    #[arg(value_name = "directories")]
    pub directories: Vec<String>,

    /// DEPRECATED and ignored, resilient is a default, use --stop-on-error
    /// if it is undesired behaviour
    #[arg(long, hide = true)]
    pub resilient: bool,

    /// Aborts scan on any error
    #[arg(long)]
    pub stop_on_error: bool,

    /// Output inodes (decimal) along with filenames
    #[arg(long)]
    pub inodes: bool,

    /// Output inodes (hexadecimal) along with filenames
    #[arg(long)]
    pub inodes_hex: bool,

    /// Output filenames as escaped strings
    #[arg(long)]
    pub raw: bool,

    /// Number of jobs(threads)
    #[arg(short = 'j', long = "jobs", default_value_t = 128, value_name = "NUM")]
    pub jobs: usize,

    /// Number of jobs for processing results, like doing stats to get file sizes
    #[arg(long, default_value_t = 128, value_name = "NUM")]
    pub result_jobs: usize,

    /// Output file sizes along with filenames
    #[arg(long = "with-size")]
    pub with_sizes: bool,

    /// Output file with atime, mtime, ctime along with filenames
    #[arg(long = "with-times")]
    pub with_times: bool,

    /// Filter files by access time older than this duration (e.g., 24h5m25s)
    #[arg(long, value_parser = parse_go_duration, default_value = "0s", value_name = "DUR")]
    pub atime_older: Duration,

    /// Filter files by access time newer than this duration (e.g., 24h5m25s)
    #[arg(long, value_parser = parse_go_duration, default_value = "0s", value_name = "DUR")]
    pub atime_newer: Duration,

    /// Filter files by modification time older than this duration (e.g., 24h5m25s)
    #[arg(long, value_parser = parse_go_duration, default_value = "0s", value_name = "DUR")]
    pub mtime_older: Duration,

    /// Filter files by modification time newer than this duration (e.g., 24h5m25s)
    #[arg(long, value_parser = parse_go_duration, default_value = "0s", value_name = "DUR")]
    pub mtime_newer: Duration,

    /// Filter files by change time older than this duration (e.g., 24h5m25s)
    #[arg(long, value_parser = parse_go_duration, default_value = "0s", value_name = "DUR")]
    pub ctime_older: Duration,

    /// Filter files by change time newer than this duration (e.g., 24h5m25s)
    #[arg(long, value_parser = parse_go_duration, default_value = "0s", value_name = "DUR")]
    pub ctime_newer: Duration,

    /// Delete found files. Non empty directories will be ignored
    #[arg(long)]
    pub delete: bool,

    /// Delete found files. Non empty directories will be removed with ALL
    /// their contents!!!
    #[arg(long)]
    pub delete_all: bool,

    /// Patterns to exclude. Can be specified multiple times
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude: Vec<String>,

    /// Patterns to filter by. Can be specified multiple times
    #[arg(short = 'f', long = "filter", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub filter: Vec<String>,

    /// Search entries of specific type.
    /// Possible values: file, dir, link, socket, all. Can be specified
    /// multiple times
    #[arg(
        short = 't',
        long = "type",
        value_name = "TYPE",
        action = clap::ArgAction::Append,
        default_values_t = ["file".to_string(), "dir".to_string(), "link".to_string(), "socket".to_string()]
    )]
    pub types: Vec<String>,

    /// Timeout for readdir operations. Error will be reported, but os thread
    /// will be kept hanging
    #[arg(long, value_parser = parse_go_duration, default_value = "5m", value_name = "DUR")]
    pub timeout: Duration,
}

/// Parse a Go-style duration literal such as "24h5m25s", "10ms" or "0".
///
/// Units: h, m, s, ms, us/µs, ns. Fractions are accepted ("1.5h").
pub fn parse_go_duration(s: &str) -> std::result::Result<Duration, String> {
    const UNITS: [(&str, f64); 7] = [
        ("ns", 1e-9),
        ("us", 1e-6),
        ("µs", 1e-6),
        ("ms", 1e-3),
        ("s", 1.0),
        ("m", 60.0),
        ("h", 3600.0),
    ];

    let text = s.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_secs = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{s}'"))?;
        if number_len == 0 {
            return Err(format!("invalid duration '{s}'"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration '{s}'"))?;
        rest = &rest[number_len..];

        let mut matched = None;
        for (unit, mult) in UNITS {
            if let Some(after) = rest.strip_prefix(unit) {
                matched = Some((after, mult));
                break;
            }
        }
        let (after, mult) = matched.ok_or_else(|| format!("unknown unit in duration '{s}'"))?;
        total_secs += value * mult;
        rest = after;
    }

    if !total_secs.is_finite() || total_secs < 0.0 {
        return Err(format!("invalid duration '{s}'"));
    }
    Ok(Duration::from_secs_f64(total_secs))
}

/// Expand a leading `~` to the value of $HOME
pub fn expand_home_path(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}{}", home, &path[1..]);
        }
    }
    path.to_string()
}

/// Which entry types are emitted as results
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeSet {
    pub files: bool,
    pub dirs: bool,
    pub links: bool,
    pub sockets: bool,
    pub any: bool,
}

impl TypeSet {
    /// Build from the repeated --type values
    pub fn from_names(names: &[String]) -> Result<Self> {
        let mut set = TypeSet::default();
        for name in names {
            match name.as_str() {
                "file" => set.files = true,
                "dir" => set.dirs = true,
                "link" => set.links = true,
                "socket" => set.sockets = true,
                "all" => set.any = true,
                other => {
                    return Err(FindError::InvalidType {
                        value: other.to_string(),
                    })
                }
            }
        }
        Ok(set)
    }

    /// Whether entries of this kind are emitted
    pub fn admits(&self, kind: EntryKind) -> bool {
        if self.any {
            return true;
        }
        match kind {
            EntryKind::File => self.files,
            EntryKind::Directory => self.dirs,
            EntryKind::Symlink => self.links,
            EntryKind::Socket => self.sockets,
            _ => false,
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Seed directories
    pub directories: Vec<String>,

    /// Log-and-skip per-unit errors instead of aborting
    pub resilient: bool,

    /// Concurrent directory readers
    pub threads: usize,

    /// Concurrent result writers
    pub result_jobs: usize,

    /// Per-syscall deadline for open and readdir
    pub timeout: Duration,

    /// Include/exclude emission filter
    pub path_filter: PathFilter,

    /// Emitted entry types
    pub types: TypeSet,

    /// Time-window predicates
    pub time_windows: TimeWindows,

    /// Append decimal inode to each record
    pub inodes: bool,

    /// Append hexadecimal inode to each record
    pub inodes_hex: bool,

    /// Emit paths as escaped string literals
    pub raw: bool,

    /// Append lstat size to each record
    pub with_sizes: bool,

    /// Append atime/mtime/ctime to each record
    pub with_times: bool,

    /// Remove each emitted entry (non-recursive)
    pub delete: bool,

    /// Remove each emitted entry recursively
    pub delete_all: bool,
}

impl Config {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut directories = args.directories;
        if directories.is_empty() {
            directories.push(".".to_string());
        }

        let threads = args.jobs.max(1);
        let path_filter = PathFilter::new(&args.filter, &args.exclude)?;
        let types = TypeSet::from_names(&args.types)?;

        Ok(Self {
            directories,
            resilient: !args.stop_on_error,
            threads,
            result_jobs: args.result_jobs.max(1),
            timeout: args.timeout,
            path_filter,
            types,
            time_windows: TimeWindows {
                atime_older: args.atime_older,
                atime_newer: args.atime_newer,
                mtime_older: args.mtime_older,
                mtime_newer: args.mtime_newer,
                ctime_older: args.ctime_older,
                ctime_newer: args.ctime_newer,
            },
            inodes: args.inodes,
            inodes_hex: args.inodes_hex,
            raw: args.raw,
            with_sizes: args.with_sizes,
            with_times: args.with_times,
            delete: args.delete,
            delete_all: args.delete_all,
        })
    }

    /// Work channel capacity: at least MIN_CHANNEL_CAPACITY so enqueue
    /// rarely spills under normal fan-out
    pub fn channel_capacity(&self) -> usize {
        self.threads.max(MIN_CHANNEL_CAPACITY)
    }

    /// Whether emission requires a stat for timestamps
    pub fn times_needed(&self) -> bool {
        self.with_times || self.time_windows.any_enabled()
    }
}

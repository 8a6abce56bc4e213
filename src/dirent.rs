//! Raw directory reading and entry decoding
//!
//! This module is the platform boundary: it wraps the `getdents64` system
//! call and decodes the kernel's packed `linux_dirent64` records into
//! `(name, inode, type)` tuples without copying names out of the buffer.
//!
//! Record layout (linux_dirent64):
//!
//! ```text
//! offset  0  u64  d_ino
//! offset  8  i64  d_off
//! offset 16  u16  d_reclen   (total record length, including padding)
//! offset 18  u8   d_type     (DT_* constant)
//! offset 19  ...  d_name     (NUL-terminated)
//! ```
//!
//! The decoder never reads past the filled length of the buffer and never
//! interprets a name beyond its record's declared length. A record that
//! violates the layout aborts the directory with a decode error.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// Decode buffer size for a single getdents64 call
pub const DECODE_BUF_LEN: usize = 64 * 1024;

/// Fixed header length of a linux_dirent64 record (up to d_name)
const DIRENT_HEADER_LEN: usize = 19;

/// Classification of a directory entry, from the kernel's d_type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Unix socket
    Socket,
    /// Character device
    CharDevice,
    /// Block device
    BlockDevice,
    /// Named pipe (FIFO)
    Fifo,
    /// Unrecognized d_type value (includes DT_UNKNOWN)
    Unknown(u8),
}

impl EntryKind {
    /// Map a raw d_type tag to an entry kind
    pub fn from_dtype(dtype: u8) -> Self {
        match dtype {
            libc::DT_REG => EntryKind::File,
            libc::DT_DIR => EntryKind::Directory,
            libc::DT_LNK => EntryKind::Symlink,
            libc::DT_SOCK => EntryKind::Socket,
            libc::DT_CHR => EntryKind::CharDevice,
            libc::DT_BLK => EntryKind::BlockDevice,
            libc::DT_FIFO => EntryKind::Fifo,
            other => EntryKind::Unknown(other),
        }
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryKind::Directory
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "dir"),
            EntryKind::Symlink => write!(f, "link"),
            EntryKind::Socket => write!(f, "socket"),
            EntryKind::CharDevice => write!(f, "char"),
            EntryKind::BlockDevice => write!(f, "block"),
            EntryKind::Fifo => write!(f, "fifo"),
            EntryKind::Unknown(v) => write!(f, "unknown({v})"),
        }
    }
}

/// An open directory file descriptor for raw entry reads.
///
/// Shareable behind an `Arc` so a deadline helper that outlives its caller
/// keeps the descriptor alive until the stuck syscall resolves.
#[derive(Debug)]
pub struct DirHandle {
    fd: OwnedFd,
    path: String,
}

impl DirHandle {
    /// Open a directory for raw entry reads
    pub fn open(path: &str) -> io::Result<Self> {
        let c_path = CString::new(path.as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;

        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            // SAFETY: fd was just returned by open() and is owned by no one else
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            path: path.to_string(),
        })
    }

    /// Fill `buf` with raw dirent records, returning the number of bytes
    /// written. Zero means end of directory.
    pub fn read_entries(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::syscall(
                libc::SYS_getdents64,
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// The path this handle was opened on
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// One decoded entry, borrowing its name from the decode buffer
#[derive(Debug, PartialEq, Eq)]
pub struct RawDirent<'buf> {
    pub ino: u64,
    pub kind: EntryKind,
    pub name: &'buf [u8],
}

/// A structurally invalid record in the dirent buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    /// Byte offset of the bad record within the buffer
    pub offset: usize,
    pub detail: &'static str,
}

/// Iterator over the records of a filled dirent buffer.
///
/// Skips `.` and `..`. Yields an error (and then fuses) on the first
/// malformed record.
pub struct DirentIter<'buf> {
    buf: &'buf [u8],
    pos: usize,
}

impl<'buf> DirentIter<'buf> {
    /// Iterate over the first `len` bytes of `buf`, as returned by a
    /// `read_entries` call.
    pub fn new(buf: &'buf [u8], len: usize) -> Self {
        debug_assert!(len <= buf.len());
        Self {
            buf: &buf[..len.min(buf.len())],
            pos: 0,
        }
    }

    fn fail(&mut self, detail: &'static str) -> Option<Result<RawDirent<'buf>, DecodeError>> {
        let offset = self.pos;
        self.pos = self.buf.len();
        Some(Err(DecodeError { offset, detail }))
    }
}

impl<'buf> Iterator for DirentIter<'buf> {
    type Item = Result<RawDirent<'buf>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos >= self.buf.len() {
                return None;
            }
            let rec = &self.buf[self.pos..];
            if rec.len() < DIRENT_HEADER_LEN + 1 {
                return self.fail("truncated record header");
            }

            let ino = u64::from_ne_bytes(rec[0..8].try_into().unwrap());
            let reclen = u16::from_ne_bytes(rec[16..18].try_into().unwrap()) as usize;
            let dtype = rec[18];

            if reclen <= DIRENT_HEADER_LEN {
                return self.fail("record length smaller than header");
            }
            if reclen > rec.len() {
                return self.fail("record length exceeds buffer");
            }

            let name_area = &rec[DIRENT_HEADER_LEN..reclen];
            let name_len = match name_area.iter().position(|&b| b == 0) {
                Some(n) => n,
                None => return self.fail("unterminated name"),
            };
            let name = &name_area[..name_len];

            self.pos += reclen;

            if name == b"." || name == b".." {
                continue;
            }

            return Some(Ok(RawDirent {
                ino,
                kind: EntryKind::from_dtype(dtype),
                name,
            }));
        }
    }
}

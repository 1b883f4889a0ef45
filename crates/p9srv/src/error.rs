//! Error type used throughout the crate.
//!
//! Mirrors the wire-level split a 9P `Rerror` reply makes: a human-readable
//! message always, and (under 9P2000.u) a numeric errno alongside it.

use std::fmt;
use std::io;

/// POSIX-ish errno constants used by this crate.
///
/// These are the values placed on the wire under 9P2000.u; under plain
/// 9P2000 only the message string travels and the numeric code is unused.
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EBADF: i32 = 9;
    pub const EEXIST: i32 = 17;
    pub const ENOTDIR: i32 = 20;
    pub const EINVAL: i32 = 22;
    pub const EPROTO: i32 = 71;
    pub const EOPNOTSUPP: i32 = 95;
}

use errno::*;

/// The crate's error type.
#[derive(Debug)]
pub enum Error {
    /// A generic errno with a message derived from a small lookup table.
    No(i32),
    /// An explicit message paired with its wire errno.
    ///
    /// Needed because `Enotempty` and `Eperm` carry the same wire errno
    /// (`EPERM`) but different human messages, so the message can't be
    /// recovered from the errno alone.
    Proto(String, i32),
    /// A transport-level I/O failure.
    Io(io::Error),
}

impl Error {
    /// "file already exists" (`EEXIST`).
    pub fn eexist() -> Error {
        Error::Proto("file already exists".to_owned(), EEXIST)
    }

    /// "file not found" (`ENOENT`).
    pub fn enoent() -> Error {
        Error::Proto("file not found".to_owned(), ENOENT)
    }

    /// "directory not empty" (wire errno `EPERM`, per the source protocol).
    pub fn enotempty() -> Error {
        Error::Proto("directory not empty".to_owned(), EPERM)
    }

    /// "permission denied" (`EPERM`).
    pub fn eperm() -> Error {
        Error::Proto("permission denied".to_owned(), EPERM)
    }

    /// The wire errno for this error (0 if none is meaningful).
    pub fn errno(&self) -> i32 {
        match self {
            Error::No(e) => *e,
            Error::Proto(_, e) => *e,
            Error::Io(e) => e.raw_os_error().unwrap_or(EIO_FALLBACK),
        }
    }

    /// The human-readable message for this error.
    pub fn message(&self) -> String {
        match self {
            Error::No(e) => strerror(*e).to_owned(),
            Error::Proto(msg, _) => msg.clone(),
            Error::Io(e) => e.to_string(),
        }
    }
}

const EIO_FALLBACK: i32 = 5;

fn strerror(e: i32) -> &'static str {
    match e {
        EPERM => "permission denied",
        ENOENT => "file not found",
        EBADF => "bad file descriptor",
        EEXIST => "file already exists",
        ENOTDIR => "not a directory",
        EINVAL => "invalid argument",
        EPROTO => "protocol error",
        EOPNOTSUPP => "operation not supported",
        _ => "error",
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

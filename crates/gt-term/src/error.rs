// SPDX-License-Identifier: MIT
//
// Error taxonomy for the driver.
//
// Only failures a caller can act on surface here. "No input available"
// is not an error at all (the byte source just returns `None`), and
// malformed escape sequences are swallowed by the parser, which
// resynchronises on the next ESC.

use std::fmt;
use std::io;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The POSIX shared-memory step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOp {
    /// `shm_open`
    Open,
    /// `ftruncate`
    Resize,
    /// `mmap`
    Map,
}

impl fmt::Display for ShmOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Resize => "truncate",
            Self::Map => "mmap",
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("stdin is not a terminal")]
    NotATerminal,

    #[error("terminal did not report a pixel size")]
    NoPixelSize,

    #[error("failed to {op} shm ({name}): {source}")]
    Shm {
        op: ShmOp,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to initialise logging: {0}")]
    Log(String),
}

impl Error {
    /// Build an [`Error::Shm`] from the current `errno`.
    ///
    /// `errno` is read before `name` is copied; the allocation may
    /// overwrite it.
    pub(crate) fn shm(op: ShmOp, name: &str) -> Self {
        let source = io::Error::last_os_error();
        Self::Shm {
            op,
            name: name.to_owned(),
            source,
        }
    }
}

//! Stream error taxonomy.
//!
//! End of data is not an error: a backend read of zero bytes sets the
//! stream's EOF indicator and the read returns a short count.

use std::io;

use thiserror::Error;

use crate::errno;

/// Errors surfaced by backends, the buffer engine and stream entry points.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The backend has no function for the attempted direction.
    #[error("operation not supported: backend has no {0} function")]
    Unsupported(&'static str),
    /// Malformed mode string, skip past buffered data, size arithmetic overflow.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Memory backend ceiling reached, or growth disallowed.
    #[error("no space left in memory backend")]
    OutOfSpace,
    /// Growing a buffer failed.
    #[error("out of memory")]
    OutOfMemory,
    /// A backend callback reported failure.
    #[error("backend i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl StreamError {
    /// The errno value equivalent to this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Unsupported(_) => errno::EOPNOTSUPP,
            Self::InvalidArgument(_) => errno::EINVAL,
            Self::OutOfSpace => errno::ENOSPC,
            Self::OutOfMemory => errno::ENOMEM,
            Self::Io(e) => e.raw_os_error().unwrap_or(errno::EIO),
        }
    }

    /// Build a backend error from a raw errno value.
    #[must_use]
    pub fn from_errno(code: i32) -> Self {
        match code {
            errno::EOPNOTSUPP => Self::Unsupported("requested"),
            errno::EINVAL => Self::InvalidArgument("backend rejected argument"),
            errno::ENOSPC => Self::OutOfSpace,
            errno::ENOMEM => Self::OutOfMemory,
            _ => Self::Io(io::Error::from_raw_os_error(code)),
        }
    }
}

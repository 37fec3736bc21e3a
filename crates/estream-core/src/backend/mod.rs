//! Backend contract.
//!
//! A backend is the true source/sink of bytes behind a stream. It advertises
//! which of the four operations it supports through [`Capabilities`]; the
//! buffer engine consults that set before dispatching, so an unsupported
//! direction fails with [`StreamError::Unsupported`] without calling into
//! the backend.

pub mod file;
pub mod memory;

pub use file::{FileBackend, ReaderBackend, WriterBackend};
pub use memory::{MemoryBackend, MemoryOptions};

use crate::error::{Result, StreamError};

/// Seek origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset.
    Set,
    /// Relative to the backend cursor.
    Cur,
    /// Relative to the end of data.
    End,
}

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

impl Whence {
    /// Convert from a POSIX `SEEK_*` constant.
    pub fn from_posix(whence: i32) -> Option<Whence> {
        match whence {
            SEEK_SET => Some(Whence::Set),
            SEEK_CUR => Some(Whence::Cur),
            SEEK_END => Some(Whence::End),
            _ => None,
        }
    }

    pub fn as_posix(self) -> i32 {
        match self {
            Whence::Set => SEEK_SET,
            Whence::Cur => SEEK_CUR,
            Whence::End => SEEK_END,
        }
    }
}

/// Which backend operations are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
    pub seek: bool,
    pub close: bool,
}

impl Capabilities {
    pub const ALL: Self = Self {
        read: true,
        write: true,
        seek: true,
        close: true,
    };
}

/// Read/write/seek/close callbacks over an exclusively owned cookie.
///
/// Implementations return the number of bytes transferred; a read of 0 means
/// end of data. `flush` is a pure notification issued after buffered output
/// has been handed over completely and carries no data.
pub trait Backend: Send {
    fn capabilities(&self) -> Capabilities;

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(StreamError::Unsupported("read"))
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(StreamError::Unsupported("write"))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Move the cursor; returns the new absolute position.
    fn seek(&mut self, _offset: i64, _whence: Whence) -> Result<u64> {
        Err(StreamError::Unsupported("seek"))
    }

    /// Release the cookie. Called exactly once, when the stream is destroyed.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Hand over the backing storage instead of freeing it on close.
    ///
    /// Only in-memory backends have storage to give; everything else
    /// returns `None`.
    fn snatch_buffer(&mut self) -> Option<Vec<u8>> {
        None
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        (**self).seek(offset, whence)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn snatch_buffer(&mut self) -> Option<Vec<u8>> {
        (**self).snatch_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl Backend for Nothing {
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
    }

    #[test]
    fn test_whence_from_posix() {
        assert_eq!(Whence::from_posix(0), Some(Whence::Set));
        assert_eq!(Whence::from_posix(1), Some(Whence::Cur));
        assert_eq!(Whence::from_posix(2), Some(Whence::End));
        assert_eq!(Whence::from_posix(3), None);
    }

    #[test]
    fn test_default_methods_are_unsupported() {
        let mut b = Nothing;
        let mut buf = [0u8; 4];
        assert!(matches!(b.read(&mut buf), Err(StreamError::Unsupported("read"))));
        assert!(matches!(b.write(b"x"), Err(StreamError::Unsupported("write"))));
        assert!(matches!(b.seek(0, Whence::Set), Err(StreamError::Unsupported("seek"))));
        assert!(b.flush().is_ok());
        assert!(b.close().is_ok());
        assert!(b.snatch_buffer().is_none());
    }
}

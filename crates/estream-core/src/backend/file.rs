//! Backends over `std::fs::File` and arbitrary `Read`/`Write` handles.
//!
//! [`FileBackend`] is seekable. [`ReaderBackend`] and [`WriterBackend`]
//! advertise no seek function, which is what standard input/output and
//! pipes look like to the buffer engine.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::{Backend, Capabilities, Whence};
use crate::errno;
use crate::error::{Result, StreamError};
use crate::mode::OpenFlags;

fn closed() -> StreamError {
    StreamError::Io(io::Error::from_raw_os_error(errno::EBADF))
}

fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other.map_err(StreamError::from),
        }
    }
}

/// Seekable file backend.
#[derive(Debug)]
pub struct FileBackend {
    file: Option<File>,
}

impl FileBackend {
    pub fn new(file: File) -> Self {
        Self { file: Some(file) }
    }

    /// Open `path` honoring the create/truncate/append/exclusive flags.
    pub fn open(path: impl AsRef<Path>, flags: &OpenFlags) -> Result<Self> {
        let file = flags.to_open_options().open(path)?;
        Ok(Self::new(file))
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(closed)
    }
}

impl Backend for FileBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = self.file()?;
        retry_interrupted(|| file.read(buf))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let file = self.file()?;
        retry_interrupted(|| file.write(buf))
    }

    fn flush(&mut self) -> Result<()> {
        let file = self.file()?;
        retry_interrupted(|| file.flush())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let pos = match whence {
            Whence::Set => {
                let start = u64::try_from(offset)
                    .map_err(|_| StreamError::InvalidArgument("negative absolute offset"))?;
                SeekFrom::Start(start)
            }
            Whence::Cur => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        let file = self.file()?;
        Ok(file.seek(pos)?)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the descriptor.
        self.file.take();
        Ok(())
    }
}

/// Read-only, non-seekable backend over any reader.
#[derive(Debug)]
pub struct ReaderBackend<R> {
    inner: Option<R>,
}

impl<R: Read + Send> ReaderBackend<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: Some(inner) }
    }
}

impl<R: Read + Send> Backend for ReaderBackend<R> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read: true,
            close: true,
            ..Capabilities::default()
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let inner = self.inner.as_mut().ok_or_else(closed)?;
        retry_interrupted(|| inner.read(buf))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.take();
        Ok(())
    }
}

/// Write-only, non-seekable backend over any writer.
#[derive(Debug)]
pub struct WriterBackend<W> {
    inner: Option<W>,
}

impl<W: Write + Send> WriterBackend<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: Some(inner) }
    }
}

impl<W: Write + Send> Backend for WriterBackend<W> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            write: true,
            close: true,
            ..Capabilities::default()
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let inner = self.inner.as_mut().ok_or_else(closed)?;
        retry_interrupted(|| inner.write(buf))
    }

    fn flush(&mut self) -> Result<()> {
        let inner = self.inner.as_mut().ok_or_else(closed)?;
        retry_interrupted(|| inner.flush())
    }

    fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut inner) => Ok(inner.flush()?),
            None => Ok(()),
        }
    }
}

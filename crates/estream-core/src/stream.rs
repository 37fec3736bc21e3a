//! Stream objects.
//!
//! [`StreamCore`] is the buffered state machine behind a mutex; its methods
//! are the unlocked operations and assume the caller holds the lock.
//! [`Stream`] is the owning handle: it takes the lock around each call,
//! registers itself in a [`StreamRegistry`] and deregisters on close.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::backend::{
    Backend, Capabilities, FileBackend, MemoryBackend, MemoryOptions, Whence,
};
use crate::buffer::{BufMode, StreamBuffer};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::metrics::{StreamMetrics, global_metrics};
use crate::mode::{OpenFlags, parse_mode};
use crate::registry::{RegistryGuard, StreamHandle, StreamRegistry};

/// Name reported for streams that were never given one.
pub const UNNAMED: &str = "[?]";

/// Sticky status flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Indicators {
    pub eof: bool,
    pub err: bool,
}

/// Buffered stream state over one backend.
pub struct StreamCore {
    pub(crate) buffer: StreamBuffer,
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) caps: Capabilities,
    pub(crate) strategy: BufMode,
    pub(crate) flags: OpenFlags,
    /// Buffer is in write mode.
    pub(crate) writing: bool,
    /// Backend position corresponding to the start of the buffer.
    pub(crate) offset: u64,
    pub(crate) indicators: Indicators,
    fname: Option<String>,
    closed: bool,
}

impl std::fmt::Debug for StreamCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCore")
            .field("fname", &self.fname())
            .field("strategy", &self.strategy)
            .field("writing", &self.writing)
            .field("offset", &self.offset)
            .field("indicators", &self.indicators)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl StreamCore {
    /// Initialize stream state. A writable access mode starts the stream in
    /// write mode.
    pub fn new(backend: Box<dyn Backend>, flags: OpenFlags, capacity: usize) -> Self {
        let caps = backend.capabilities();
        Self {
            buffer: StreamBuffer::new(capacity),
            backend,
            caps,
            strategy: BufMode::Full,
            flags,
            writing: flags.is_writable(),
            offset: 0,
            indicators: Indicators::default(),
            fname: None,
            closed: false,
        }
    }

    /// Read up to `buf.len()` bytes. A failure after some bytes were
    /// transferred returns the short count with the error indicator set.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.read_into(buf).into_result()
    }

    /// Write up to `buf.len()` bytes; short counts follow [`Self::read`].
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.write_from(buf).into_result()
    }

    /// Write all of `buf` or fail.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let t = self.write_from(buf);
        match t.err {
            Some(e) => Err(e),
            None if t.n < buf.len() => Err(StreamError::OutOfSpace),
            None => Ok(()),
        }
    }

    /// Read one byte; `None` at end of data.
    pub fn getc(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    pub fn putc(&mut self, byte: u8) -> Result<()> {
        self.write_all(&[byte])
    }

    /// Push bytes back into the input; returns how many fit.
    pub fn unread(&mut self, bytes: &[u8]) -> Result<usize> {
        self.switch_to_read()?;
        let n = self.buffer.unread(bytes);
        if n > 0 {
            self.indicators.eof = false;
        }
        Ok(n)
    }

    /// Reposition the stream. Pending output is flushed and read-ahead and
    /// pushback data are discarded.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        if !self.caps.seek {
            return Err(self.fail(StreamError::Unsupported("seek")));
        }
        if self.writing {
            self.flush_buffer()?;
            self.writing = false;
        }

        match self.reposition(offset, whence) {
            Ok(pos) => {
                self.indicators = Indicators::default();
                StreamMetrics::inc(&global_metrics().seeks);
                Ok(pos)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Move the backend cursor and drop buffered input. Leaves the
    /// indicators alone; callers decide what a failure means.
    pub(crate) fn reposition(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let mut target = offset;
        if whence == Whence::Cur {
            // The backend cursor sits past all read-ahead.
            let ahead = self.buffer.readable().len() + self.buffer.unread_len();
            target = i64::try_from(ahead)
                .ok()
                .and_then(|a| offset.checked_sub(a))
                .ok_or(StreamError::InvalidArgument("seek offset overflow"))?;
        }

        let pos = self.backend.seek(target, whence)?;
        self.buffer.empty();
        self.offset = pos;
        Ok(pos)
    }

    /// Current logical position.
    pub fn tell(&self) -> u64 {
        let pos = self.offset + self.buffer.data_offset() as u64;
        pos.saturating_sub(self.buffer.unread_len() as u64)
    }

    /// Seek to the start and clear both indicators.
    pub fn rewind(&mut self) -> Result<()> {
        self.seek(0, Whence::Set)?;
        self.clear_error();
        Ok(())
    }

    /// Push buffered output to the backend. A no-op for a reading stream.
    pub fn flush(&mut self) -> Result<()> {
        if self.writing {
            self.flush_buffer()
        } else {
            Ok(())
        }
    }

    /// Change the buffering strategy; buffered output is flushed first.
    pub fn set_buffering(&mut self, mode: BufMode) -> Result<()> {
        if self.writing {
            self.flush_buffer()?;
        }
        self.strategy = mode;
        Ok(())
    }

    pub fn buffering(&self) -> BufMode {
        self.strategy
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn is_writing(&self) -> bool {
        self.writing
    }

    pub fn is_eof(&self) -> bool {
        self.indicators.eof
    }

    pub fn is_error(&self) -> bool {
        self.indicators.err
    }

    pub fn indicators(&self) -> Indicators {
        self.indicators
    }

    pub fn clear_error(&mut self) {
        self.indicators = Indicators::default();
    }

    pub fn set_fname(&mut self, name: &str) {
        self.fname = Some(name.to_owned());
    }

    pub fn fname(&self) -> &str {
        self.fname.as_deref().unwrap_or(UNNAMED)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flush pending output, then hand over the backend's storage.
    pub(crate) fn snatch(&mut self) -> Result<Vec<u8>> {
        if self.writing {
            self.flush_buffer()?;
        }
        self.backend
            .snatch_buffer()
            .ok_or(StreamError::Unsupported("snatch"))
    }

    /// Flush if writing, then close the backend. Every step runs; the first
    /// error is reported. Calling it again is a no-op.
    pub(crate) fn deinit(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut first: Option<StreamError> = None;
        if self.writing {
            if let Err(e) = self.flush_buffer() {
                first.get_or_insert(e);
            }
        }
        if self.caps.close {
            if let Err(e) = self.backend.close() {
                warn!(fname = %self.fname(), error = %e, "backend close failed");
                first.get_or_insert(e);
            }
        }
        self.buffer.empty();
        self.buffer.reset_written();
        self.fname = None;
        self.closed = true;
        first.map_or(Ok(()), Err)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Per-stream options applied at creation.
#[derive(Debug, Clone)]
pub struct StreamBuilder {
    buffer_size: usize,
    strategy: BufMode,
    fname: Option<String>,
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBuilder {
    /// Full buffering with the buffer size from the environment.
    pub fn new() -> Self {
        Self::with_config(&StreamConfig::from_env())
    }

    pub fn with_config(config: &StreamConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            strategy: BufMode::Full,
            fname: None,
        }
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn buffering(mut self, mode: BufMode) -> Self {
        self.strategy = mode;
        self
    }

    pub fn fname(mut self, name: impl Into<String>) -> Self {
        self.fname = Some(name.into());
        self
    }

    /// Create a stream over `backend` and register it.
    pub fn open(
        self,
        registry: &Arc<StreamRegistry>,
        backend: impl Backend + 'static,
        mode: &str,
    ) -> Result<Stream> {
        let mut guard = registry.lock();
        self.open_in(&mut guard, backend, mode)
    }

    /// Like [`Self::open`], for a caller already holding the registry lock.
    pub fn open_in(
        self,
        guard: &mut RegistryGuard<'_>,
        backend: impl Backend + 'static,
        mode: &str,
    ) -> Result<Stream> {
        let flags = parse_mode(mode)?;
        let mut core = StreamCore::new(Box::new(backend), flags, self.buffer_size);
        core.strategy = self.strategy;
        if let Some(name) = self.fname {
            core.set_fname(&name);
        }
        debug!(
            fname = %core.fname(),
            mode,
            buffer = core.buffer_capacity(),
            "stream opened"
        );
        let core = Arc::new(Mutex::new(core));
        let handle = guard.add(&core);
        StreamMetrics::inc(&global_metrics().opened);
        Ok(Stream {
            core,
            registry: Arc::clone(guard.registry()),
            handle: Some(handle),
        })
    }
}

// ---------------------------------------------------------------------------
// Stream handle
// ---------------------------------------------------------------------------

/// An open, registered stream.
///
/// Every method takes the stream lock for its duration. Dropping an open
/// stream closes it and logs any close failure.
#[derive(Debug)]
pub struct Stream {
    core: Arc<Mutex<StreamCore>>,
    registry: Arc<StreamRegistry>,
    handle: Option<StreamHandle>,
}

impl Stream {
    pub fn builder() -> StreamBuilder {
        StreamBuilder::new()
    }

    /// Create a stream over a caller-supplied backend.
    pub fn open(
        registry: &Arc<StreamRegistry>,
        backend: impl Backend + 'static,
        mode: &str,
    ) -> Result<Stream> {
        StreamBuilder::new().open(registry, backend, mode)
    }

    /// Create a stream over a growable memory buffer. `limit` caps the
    /// buffer size; `None` means unlimited.
    pub fn open_memory(
        registry: &Arc<StreamRegistry>,
        limit: Option<usize>,
        mode: &str,
    ) -> Result<Stream> {
        let flags = parse_mode(mode)?;
        let config = StreamConfig::from_env();
        let options = MemoryOptions {
            block_size: config.mem_block_size,
            ..MemoryOptions::from_flags(&flags)
        };
        let backend = MemoryBackend::new(options.with_limit(limit));
        StreamBuilder::with_config(&config).open(registry, backend, mode)
    }

    /// Memory stream preloaded with `data` and positioned at its start.
    pub fn open_memory_init(
        registry: &Arc<StreamRegistry>,
        limit: Option<usize>,
        mode: &str,
        data: &[u8],
    ) -> Result<Stream> {
        let stream = Self::open_memory(registry, limit, mode)?;
        if !data.is_empty() {
            let loaded = {
                let mut core = stream.lock();
                core.write_all(data).and_then(|()| core.seek(0, Whence::Set))
            };
            if let Err(e) = loaded {
                let _ = stream.close();
                return Err(e);
            }
        }
        Ok(stream)
    }

    /// Open a file by path; the path becomes the stream name.
    pub fn open_path(
        registry: &Arc<StreamRegistry>,
        path: impl AsRef<Path>,
        mode: &str,
    ) -> Result<Stream> {
        let path = path.as_ref();
        let flags = parse_mode(mode)?;
        let backend = FileBackend::open(path, &flags)?;
        StreamBuilder::new()
            .fname(path.display().to_string())
            .open(registry, backend, mode)
    }

    /// Take the stream lock for a sequence of unlocked operations.
    pub fn lock(&self) -> MutexGuard<'_, StreamCore> {
        self.core.lock()
    }

    pub fn handle(&self) -> Option<StreamHandle> {
        self.handle
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.core.lock().read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.core.lock().write(buf)
    }

    pub fn write_all(&self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.core.lock().write_all(buf)
    }

    pub fn getc(&self) -> Result<Option<u8>> {
        self.core.lock().getc()
    }

    pub fn putc(&self, byte: u8) -> Result<()> {
        self.core.lock().putc(byte)
    }

    pub fn unread(&self, bytes: &[u8]) -> Result<usize> {
        self.core.lock().unread(bytes)
    }

    pub fn seek(&self, offset: i64, whence: Whence) -> Result<u64> {
        self.core.lock().seek(offset, whence)
    }

    pub fn tell(&self) -> u64 {
        self.core.lock().tell()
    }

    pub fn rewind(&self) -> Result<()> {
        self.core.lock().rewind()
    }

    pub fn flush(&self) -> Result<()> {
        self.core.lock().flush()
    }

    pub fn set_buffering(&self, mode: BufMode) -> Result<()> {
        self.core.lock().set_buffering(mode)
    }

    pub fn read_line(&self, max_length: usize, line: &mut Vec<u8>) -> Result<usize> {
        self.core.lock().read_line(max_length, line)
    }

    pub fn getline(&self, line: &mut Vec<u8>) -> Result<usize> {
        self.core.lock().getline(line)
    }

    pub fn is_eof(&self) -> bool {
        self.core.lock().is_eof()
    }

    pub fn is_error(&self) -> bool {
        self.core.lock().is_error()
    }

    pub fn clear_error(&self) {
        self.core.lock().clear_error();
    }

    pub fn set_fname(&self, name: &str) {
        self.core.lock().set_fname(name);
    }

    pub fn fname(&self) -> String {
        self.core.lock().fname().to_owned()
    }

    /// Close the stream: deregister, flush pending output, close the
    /// backend. Every step runs; the first error is returned.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    /// Close the stream while the caller holds the registry lock.
    pub fn close_in(mut self, guard: &mut RegistryGuard<'_>) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        guard.remove(handle);
        self.finish()
    }

    /// Close the stream and take ownership of the backend's storage, as
    /// for a memory stream. Fails with `Unsupported` for backends that own
    /// no storage.
    pub fn close_snatch(mut self) -> Result<Vec<u8>> {
        let snatched = self.core.lock().snatch();
        let closed = self.shutdown();
        let data = snatched?;
        closed?;
        Ok(data)
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.registry.remove(handle);
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        let mut core = self.core.lock();
        let fname = core.fname().to_owned();
        let result = core.deinit();
        StreamMetrics::inc(&global_metrics().closed);
        debug!(fname = %fname, ok = result.is_ok(), "stream closed");
        result
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "close on drop failed");
        }
    }
}

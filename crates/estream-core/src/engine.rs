//! Buffer engine: moves bytes between a stream buffer and its backend.
//!
//! The read side fills the buffer from the backend and serves requests out
//! of it; the write side accumulates output according to the buffering
//! strategy and drains it on flush. Every backend failure sets the stream's
//! sticky error indicator.

use std::io;

use tracing::{trace, warn};

use crate::backend::Whence;
use crate::buffer::BufMode;
use crate::errno::{self, ESPIPE};
use crate::error::{Result, StreamError};
use crate::metrics::{StreamMetrics, global_metrics};
use crate::stream::StreamCore;

/// Outcome of a read or write: the bytes moved before the operation
/// stopped, and the error that stopped it, if any.
#[derive(Debug)]
pub(crate) struct Transfer {
    pub n: usize,
    pub err: Option<StreamError>,
}

impl Transfer {
    fn done(n: usize) -> Self {
        Self { n, err: None }
    }

    fn stopped(n: usize, err: StreamError) -> Self {
        Self { n, err: Some(err) }
    }

    fn plus(mut self, before: usize) -> Self {
        self.n += before;
        self
    }

    /// An error only surfaces when nothing was transferred.
    pub fn into_result(self) -> Result<usize> {
        match self.err {
            Some(e) if self.n == 0 => Err(e),
            _ => Ok(self.n),
        }
    }
}

fn write_zero() -> StreamError {
    StreamError::Io(io::Error::new(
        io::ErrorKind::WriteZero,
        "backend accepted no bytes",
    ))
}

impl StreamCore {
    /// Set the error indicator and pass the error through.
    pub(crate) fn fail(&mut self, err: StreamError) -> StreamError {
        self.indicators.err = true;
        StreamMetrics::inc(&global_metrics().errors);
        warn!(
            fname = %self.fname(),
            errno = errno::name(err.errno()),
            error = %err,
            "stream operation failed"
        );
        err
    }

    /// Replace the buffer contents with one backend read.
    pub(crate) fn fill(&mut self) -> Result<()> {
        self.offset += self.buffer.data_len() as u64;
        if !self.caps.read {
            self.buffer.set_filled(0);
            return Err(self.fail(StreamError::Unsupported("read")));
        }
        match self.backend.read(self.buffer.fill_slot()) {
            Ok(n) => {
                self.buffer.set_filled(n);
                let n = self.buffer.data_len();
                if n == 0 {
                    self.indicators.eof = true;
                }
                let m = global_metrics();
                StreamMetrics::inc(&m.fills);
                StreamMetrics::add(&m.bytes_read, n);
                trace!(fname = %self.fname(), bytes = n, "buffer filled");
                Ok(())
            }
            Err(e) => {
                self.buffer.set_filled(0);
                Err(self.fail(e))
            }
        }
    }

    /// Drain pending output to the backend, then send a flush notification.
    ///
    /// A partial drain keeps the unsent tail so a retry resumes where the
    /// backend stopped.
    pub(crate) fn flush_buffer(&mut self) -> Result<()> {
        debug_assert!(self.writing);
        if self.buffer.pending().is_empty() {
            return Ok(());
        }
        if !self.caps.write {
            return Err(self.fail(StreamError::Unsupported("write")));
        }
        while !self.buffer.pending().is_empty() {
            let want = self.buffer.pending().len();
            match self.backend.write(self.buffer.pending()) {
                Ok(0) => return Err(self.fail(write_zero())),
                Ok(n) => {
                    let n = n.min(want);
                    self.buffer.mark_flushed(n);
                    StreamMetrics::add(&global_metrics().bytes_written, n);
                }
                Err(e) => return Err(self.fail(e)),
            }
        }

        let flushed = self.buffer.data_offset();
        self.offset += flushed as u64;
        self.sync_append_offset();
        self.buffer.reset_written();
        StreamMetrics::inc(&global_metrics().flushes);
        trace!(fname = %self.fname(), bytes = flushed, "buffer flushed");

        self.backend.flush().map_err(|e| self.fail(e))
    }

    /// Leave write mode, flushing pending output.
    pub(crate) fn switch_to_read(&mut self) -> Result<()> {
        if self.writing {
            self.flush_buffer()?;
            self.writing = false;
        }
        Ok(())
    }

    /// Enter write mode. Read-ahead is discarded; on a seekable backend the
    /// backend cursor is first moved back to the logical position.
    pub(crate) fn switch_to_write(&mut self) -> Result<()> {
        if self.writing {
            return Ok(());
        }
        if self.caps.seek {
            match self.reposition(0, Whence::Cur) {
                Ok(_) => {}
                Err(e) if e.errno() == ESPIPE => self.retire_read_ahead(),
                Err(e) => return Err(self.fail(e)),
            }
        } else {
            self.retire_read_ahead();
        }
        self.writing = true;
        Ok(())
    }

    /// Drop buffered input without repositioning; the logical offset moves
    /// to where the backend cursor is.
    fn retire_read_ahead(&mut self) {
        self.offset += self.buffer.data_len() as u64;
        self.buffer.empty();
    }

    pub(crate) fn read_into(&mut self, buf: &mut [u8]) -> Transfer {
        if let Err(e) = self.switch_to_read() {
            return Transfer::stopped(0, e);
        }
        let n = self.buffer.take_unread(buf);
        if n == buf.len() {
            return Transfer::done(n);
        }
        let rest = &mut buf[n..];
        let t = match self.strategy {
            BufMode::None => self.read_unbuffered(rest),
            BufMode::Full | BufMode::Line => self.read_buffered(rest),
        };
        t.plus(n)
    }

    /// Serve any leftover read-ahead, then read straight from the backend.
    fn read_unbuffered(&mut self, buf: &mut [u8]) -> Transfer {
        let mut n = self.buffer.take(buf);
        if n == buf.len() {
            return Transfer::done(n);
        }
        self.retire_read_ahead();
        if !self.caps.read {
            let e = self.fail(StreamError::Unsupported("read"));
            return Transfer::stopped(n, e);
        }
        while n < buf.len() {
            match self.backend.read(&mut buf[n..]) {
                Ok(0) => {
                    self.indicators.eof = true;
                    break;
                }
                Ok(k) => {
                    let k = k.min(buf.len() - n);
                    n += k;
                    self.offset += k as u64;
                    StreamMetrics::add(&global_metrics().bytes_read, k);
                }
                Err(e) => {
                    let e = self.fail(e);
                    return Transfer::stopped(n, e);
                }
            }
        }
        Transfer::done(n)
    }

    fn read_buffered(&mut self, buf: &mut [u8]) -> Transfer {
        let mut n = 0;
        while n < buf.len() {
            if self.buffer.readable().is_empty() {
                if let Err(e) = self.fill() {
                    return Transfer::stopped(n, e);
                }
                if self.buffer.readable().is_empty() {
                    break;
                }
            }
            n += self.buffer.take(&mut buf[n..]);
        }
        Transfer::done(n)
    }

    pub(crate) fn write_from(&mut self, buf: &[u8]) -> Transfer {
        if let Err(e) = self.switch_to_write() {
            return Transfer::stopped(0, e);
        }
        match self.strategy {
            BufMode::None => self.write_unbuffered(buf),
            BufMode::Full => self.write_full(buf),
            BufMode::Line => self.write_line(buf),
        }
    }

    /// Flush what is buffered, then write straight to the backend.
    fn write_unbuffered(&mut self, buf: &[u8]) -> Transfer {
        if let Err(e) = self.flush_buffer() {
            return Transfer::stopped(0, e);
        }
        if !self.caps.write {
            let e = self.fail(StreamError::Unsupported("write"));
            return Transfer::stopped(0, e);
        }
        let mut n = 0;
        while n < buf.len() {
            match self.backend.write(&buf[n..]) {
                Ok(0) => {
                    let e = self.fail(write_zero());
                    return Transfer::stopped(n, e);
                }
                Ok(k) => {
                    let k = k.min(buf.len() - n);
                    n += k;
                    self.offset += k as u64;
                    StreamMetrics::add(&global_metrics().bytes_written, k);
                }
                Err(e) => {
                    let e = self.fail(e);
                    return Transfer::stopped(n, e);
                }
            }
        }
        self.sync_append_offset();
        Transfer::done(n)
    }

    /// Append writes land at the end of the data wherever the cursor was,
    /// so take the offset from the backend instead of counting bytes.
    fn sync_append_offset(&mut self) {
        if !(self.flags.append && self.caps.seek) {
            return;
        }
        if let Ok(pos) = self.backend.seek(0, Whence::Cur) {
            self.offset = pos;
        }
    }

    fn write_full(&mut self, buf: &[u8]) -> Transfer {
        let mut n = 0;
        while n < buf.len() {
            if self.buffer.space() == 0 {
                if let Err(e) = self.flush_buffer() {
                    return Transfer::stopped(n, e);
                }
            }
            n += self.buffer.append(&buf[n..]);
        }
        Transfer::done(n)
    }

    /// Everything through the last newline goes out now; the tail is
    /// buffered.
    fn write_line(&mut self, buf: &[u8]) -> Transfer {
        let Some(nl) = buf.iter().rposition(|&b| b == b'\n') else {
            return self.write_full(buf);
        };
        let head = self.write_unbuffered(&buf[..=nl]);
        if head.err.is_some() {
            return head;
        }
        self.write_full(&buf[nl + 1..]).plus(head.n)
    }

    /// Buffered input without consuming it; fills the buffer if it is
    /// exhausted. Pending pushback is offered first. Empty at end of data.
    pub fn peek(&mut self) -> Result<&[u8]> {
        self.switch_to_read()?;
        if self.buffer.unread_len() > 0 {
            return Ok(self.buffer.unread_view());
        }
        if self.buffer.readable().is_empty() {
            self.fill()?;
        }
        Ok(self.buffer.readable())
    }

    /// Consume `n` bytes of what [`Self::peek`] returned.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.writing {
            return Err(StreamError::InvalidArgument("skip on a writing stream"));
        }
        if self.buffer.unread_len() > 0 {
            self.buffer.consume_unread(n)
        } else {
            self.buffer.consume(n)
        }
    }
}

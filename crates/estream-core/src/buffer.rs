//! Stream buffer state.
//!
//! One fixed-capacity buffer per stream, shared by both directions: in read
//! mode it holds read-ahead data, in write mode pending output. A small
//! pushback area sits in front of it.
//!
//! Invariants:
//! - `data_offset <= data_len <= capacity`
//! - `data_flushed <= data_offset` (write mode: bytes already handed to the
//!   backend by an interrupted flush)
//! - `unread_len <= UNREAD_SIZE`
//!
//! Pushback bytes are stored back to front so the pending ones always form
//! a contiguous slice in read order: the byte pushed last is read first.

use crate::config::UNREAD_SIZE;
use crate::error::{Result, StreamError};

/// Buffering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufMode {
    /// Fully buffered: flush when buffer is full.
    Full,
    /// Line buffered: output up to the last newline goes straight out.
    Line,
    /// Unbuffered: every call reaches the backend.
    None,
}

/// POSIX constant values for setvbuf mode argument.
pub const IOFBF: i32 = 0;
pub const IOLBF: i32 = 1;
pub const IONBF: i32 = 2;

impl BufMode {
    /// Convert from POSIX integer constant.
    pub fn from_posix(mode: i32) -> Option<BufMode> {
        match mode {
            IOFBF => Some(BufMode::Full),
            IOLBF => Some(BufMode::Line),
            IONBF => Some(BufMode::None),
            _ => Option::None,
        }
    }
}

#[derive(Debug)]
pub struct StreamBuffer {
    data: Box<[u8]>,
    /// Valid bytes in `data`.
    data_len: usize,
    /// Read cursor (read mode) or fill level (write mode).
    data_offset: usize,
    /// Pending output already accepted by the backend.
    data_flushed: usize,
    unread: [u8; UNREAD_SIZE],
    unread_len: usize,
}

impl StreamBuffer {
    /// Create a buffer; capacity is at least one byte and never changes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            data_len: 0,
            data_offset: 0,
            data_flushed: 0,
            unread: [0u8; UNREAD_SIZE],
            unread_len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn data_len(&self) -> usize {
        self.data_len
    }

    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Discard read-ahead and pushback data.
    pub fn empty(&mut self) {
        self.data_len = 0;
        self.data_offset = 0;
        self.unread_len = 0;
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Buffered, unconsumed input.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.data_offset..self.data_len]
    }

    /// The whole buffer, to be filled by a backend read.
    pub fn fill_slot(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Record that a fill stored `n` fresh bytes.
    pub fn set_filled(&mut self, n: usize) {
        self.data_len = n.min(self.data.len());
        self.data_offset = 0;
    }

    /// Copy buffered input into `dst`; returns the number of bytes taken.
    pub fn take(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.data_len - self.data_offset);
        dst[..n].copy_from_slice(&self.data[self.data_offset..self.data_offset + n]);
        self.data_offset += n;
        n
    }

    /// Advance the read cursor without copying.
    pub fn consume(&mut self, n: usize) -> Result<()> {
        if n > self.data_len - self.data_offset {
            return Err(StreamError::InvalidArgument("skip past buffered data"));
        }
        self.data_offset += n;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pushback
    // -----------------------------------------------------------------------

    pub fn unread_len(&self) -> usize {
        self.unread_len
    }

    /// Push bytes back, each one ahead of the previous; returns how many fit.
    pub fn unread(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(UNREAD_SIZE - self.unread_len);
        for &b in &bytes[..n] {
            self.unread_len += 1;
            self.unread[UNREAD_SIZE - self.unread_len] = b;
        }
        n
    }

    /// Pending pushback bytes in read order.
    pub fn unread_view(&self) -> &[u8] {
        &self.unread[UNREAD_SIZE - self.unread_len..]
    }

    pub fn take_unread(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.unread_len);
        dst[..n].copy_from_slice(&self.unread_view()[..n]);
        self.unread_len -= n;
        n
    }

    pub fn consume_unread(&mut self, n: usize) -> Result<()> {
        if n > self.unread_len {
            return Err(StreamError::InvalidArgument("skip past pushback data"));
        }
        self.unread_len -= n;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Write side
    // -----------------------------------------------------------------------

    /// Free space for more output.
    pub fn space(&self) -> usize {
        self.data.len() - self.data_offset
    }

    /// Copy as much of `src` as fits; returns the number of bytes buffered.
    pub fn append(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.space());
        self.data[self.data_offset..self.data_offset + n].copy_from_slice(&src[..n]);
        self.data_offset += n;
        self.data_len = self.data_offset;
        n
    }

    /// Output not yet accepted by the backend.
    pub fn pending(&self) -> &[u8] {
        &self.data[self.data_flushed..self.data_offset]
    }

    /// Record that the backend accepted `n` more pending bytes.
    pub fn mark_flushed(&mut self, n: usize) {
        self.data_flushed = (self.data_flushed + n).min(self.data_offset);
    }

    /// Forget all output after a complete flush.
    pub fn reset_written(&mut self) {
        self.data_len = 0;
        self.data_offset = 0;
        self.data_flushed = 0;
    }
}

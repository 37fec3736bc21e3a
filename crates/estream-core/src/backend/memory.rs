//! In-memory backend over a growable byte buffer.
//!
//! Invariants:
//! - `offset <= memory.len()` and `data_len <= memory.len()`
//! - `memory.len()` is the allocated size; once grown it is a multiple of
//!   `block_size`, or exactly the ceiling when rounding would overshoot it
//! - growth past the ceiling fails with [`StreamError::OutOfSpace`]; it never
//!   truncates while growth is allowed
//!
//! Growth is check-then-grow on every path: the required size is computed
//! with overflow detection, compared against the ceiling, rounded up to the
//! block size, and only then reallocated.

use tracing::trace;

use super::{Backend, Capabilities, Whence};
use crate::config::BUFSIZ;
use crate::error::{Result, StreamError};
use crate::mode::OpenFlags;

/// Construction parameters for [`MemoryBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOptions {
    /// Allocation granularity.
    pub block_size: usize,
    /// Whether the buffer may be reallocated.
    pub grow: bool,
    /// Hard ceiling on the allocated size.
    pub limit: Option<usize>,
    /// Every write goes to the end of data.
    pub append: bool,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            block_size: BUFSIZ,
            grow: true,
            limit: None,
            append: false,
        }
    }
}

impl MemoryOptions {
    /// Growable defaults with append taken from the open flags.
    pub fn from_flags(flags: &OpenFlags) -> Self {
        Self {
            append: flags.append,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn fixed(mut self) -> Self {
        self.grow = false;
        self
    }
}

/// Round `required` up to a multiple of `block_size`.
fn rounded_size(required: usize, block_size: usize) -> Result<usize> {
    required
        .checked_next_multiple_of(block_size.max(1))
        .ok_or(StreamError::InvalidArgument("memory size overflow"))
}

#[derive(Debug)]
pub struct MemoryBackend {
    memory: Vec<u8>,
    limit: Option<usize>,
    offset: usize,
    data_len: usize,
    block_size: usize,
    grow: bool,
    append: bool,
}

impl MemoryBackend {
    /// Empty backend; nothing is allocated until the first write or seek.
    pub fn new(options: MemoryOptions) -> Self {
        Self {
            memory: Vec::new(),
            limit: options.limit,
            offset: 0,
            data_len: 0,
            block_size: options.block_size.max(1),
            grow: options.grow,
            append: options.append,
        }
    }

    /// Backend over caller-supplied storage.
    ///
    /// `memory_size` is the allocated size to adopt (the vector is zero
    /// extended to it) and `data_len` the number of bytes already holding
    /// data. Passing no storage with a nonzero size or length is an
    /// invalid argument.
    pub fn from_parts(
        memory: Option<Vec<u8>>,
        memory_size: usize,
        data_len: usize,
        options: MemoryOptions,
    ) -> Result<Self> {
        let mut backend = Self::new(options);
        match memory {
            None if memory_size != 0 || data_len != 0 => {
                return Err(StreamError::InvalidArgument(
                    "nonzero memory size without memory",
                ));
            }
            None => {}
            Some(mut memory) => {
                if data_len > memory_size {
                    return Err(StreamError::InvalidArgument("data length exceeds memory size"));
                }
                if memory.len() > memory_size {
                    return Err(StreamError::InvalidArgument("memory longer than memory size"));
                }
                memory.resize(memory_size, 0);
                backend.memory = memory;
                backend.data_len = data_len;
            }
        }
        Ok(backend)
    }

    /// Backend pre-filled with `data`, cursor at the start.
    pub fn with_data(data: Vec<u8>, options: MemoryOptions) -> Self {
        let len = data.len();
        Self {
            memory: data,
            data_len: len,
            ..Self::new(options)
        }
    }

    /// Bytes holding data.
    pub fn data(&self) -> &[u8] {
        &self.memory[..self.data_len]
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Allocated size.
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    fn grow_to(&mut self, required: usize) -> Result<()> {
        if required <= self.memory.len() {
            return Ok(());
        }
        if let Some(limit) = self.limit {
            if required > limit {
                return Err(StreamError::OutOfSpace);
            }
        }
        let mut new_size = rounded_size(required, self.block_size)?;
        if let Some(limit) = self.limit {
            new_size = new_size.min(limit);
        }
        self.memory
            .try_reserve_exact(new_size - self.memory.len())
            .map_err(|_| StreamError::OutOfMemory)?;
        self.memory.resize(new_size, 0);
        trace!(capacity = new_size, "memory backend grown");
        Ok(())
    }
}

impl Backend for MemoryBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.data_len - self.offset);
        buf[..n].copy_from_slice(&self.memory[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.append {
            self.offset = self.data_len;
        }

        let nleft = self.memory.len() - self.offset;
        let mut size = buf.len();
        if !self.grow && size > nleft {
            size = nleft;
        }
        if size > nleft {
            let required = self
                .offset
                .checked_add(size)
                .ok_or(StreamError::InvalidArgument("memory size overflow"))?;
            self.grow_to(required)?;
        }

        self.memory[self.offset..self.offset + size].copy_from_slice(&buf[..size]);
        self.offset += size;
        if self.offset > self.data_len {
            self.data_len = self.offset;
        }
        Ok(size)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.offset,
            Whence::End => self.data_len,
        };
        let pos = base as i128 + i128::from(offset);
        if pos < 0 {
            return Err(StreamError::InvalidArgument("seek before start of data"));
        }
        let pos = usize::try_from(pos)
            .map_err(|_| StreamError::InvalidArgument("seek offset overflow"))?;

        if pos > self.memory.len() {
            if !self.grow {
                return Err(StreamError::OutOfSpace);
            }
            self.grow_to(pos)?;
        }
        if pos > self.data_len {
            self.memory[self.data_len..pos].fill(0);
            self.data_len = pos;
        }
        self.offset = pos;
        Ok(pos as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.memory = Vec::new();
        self.offset = 0;
        self.data_len = 0;
        Ok(())
    }

    fn snatch_buffer(&mut self) -> Option<Vec<u8>> {
        let mut memory = std::mem::take(&mut self.memory);
        memory.truncate(self.data_len);
        self.offset = 0;
        self.data_len = 0;
        Some(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(block: usize) -> MemoryOptions {
        MemoryOptions {
            block_size: block,
            ..MemoryOptions::default()
        }
    }

    #[test]
    fn test_read_stops_at_data_len() {
        let mut m = MemoryBackend::with_data(b"hello".to_vec(), MemoryOptions::default());
        let mut buf = [0u8; 8];
        assert_eq!(m.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(m.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_grows_in_blocks() {
        let mut m = MemoryBackend::new(small(16));
        assert_eq!(m.write(b"abc").unwrap(), 3);
        assert_eq!(m.capacity(), 16);
        assert_eq!(m.write(&[b'x'; 20]).unwrap(), 20);
        assert_eq!(m.capacity(), 32);
        assert_eq!(m.data().len(), 23);
    }

    #[test]
    fn test_fixed_memory_clamps_writes() {
        let mut m = MemoryBackend::from_parts(Some(vec![0; 4]), 4, 0, small(16).fixed()).unwrap();
        assert_eq!(m.write(b"abcdef").unwrap(), 4);
        assert_eq!(m.data(), b"abcd");
        assert_eq!(m.write(b"gh").unwrap(), 0);
        assert_eq!(m.capacity(), 4);
    }

    #[test]
    fn test_ceiling_rejects_growth() {
        let mut m = MemoryBackend::new(small(16).with_limit(Some(40)));
        assert_eq!(m.write(&[1u8; 30]).unwrap(), 30);
        // Rounded size 32 fits; next growth would need 41 bytes.
        assert_eq!(m.capacity(), 32);
        assert_eq!(m.write(&[2u8; 10]).unwrap(), 10);
        assert_eq!(m.capacity(), 40);
        assert!(matches!(m.write(&[3u8; 1]), Err(StreamError::OutOfSpace)));
        assert_eq!(m.data().len(), 40);
    }

    #[test]
    fn test_append_writes_at_end() {
        let opts = MemoryOptions {
            append: true,
            ..small(8)
        };
        let mut m = MemoryBackend::with_data(b"head".to_vec(), opts);
        m.seek(0, Whence::Set).unwrap();
        m.write(b"tail").unwrap();
        assert_eq!(m.data(), b"headtail");
    }

    #[test]
    fn test_seek_past_end_zero_fills() {
        let mut m = MemoryBackend::new(small(8));
        m.write(b"ab").unwrap();
        assert_eq!(m.seek(10, Whence::Set).unwrap(), 10);
        assert_eq!(m.capacity(), 16);
        m.write(b"z").unwrap();
        assert_eq!(m.data(), b"ab\0\0\0\0\0\0\0\0z");
    }

    #[test]
    fn test_seek_relative_and_from_end() {
        let mut m = MemoryBackend::with_data(b"0123456789".to_vec(), small(8));
        assert_eq!(m.seek(4, Whence::Set).unwrap(), 4);
        assert_eq!(m.seek(-2, Whence::Cur).unwrap(), 2);
        assert_eq!(m.seek(-1, Whence::End).unwrap(), 9);
        assert!(matches!(m.seek(-11, Whence::End), Err(StreamError::InvalidArgument(_))));
        assert_eq!(m.offset(), 9);
    }

    #[test]
    fn test_seek_without_growth_fails() {
        let mut m = MemoryBackend::from_parts(Some(vec![0; 8]), 8, 8, small(8).fixed()).unwrap();
        assert_eq!(m.seek(8, Whence::Set).unwrap(), 8);
        assert!(matches!(m.seek(9, Whence::Set), Err(StreamError::OutOfSpace)));
    }

    #[test]
    fn test_seek_respects_ceiling() {
        let mut m = MemoryBackend::new(small(8).with_limit(Some(12)));
        assert_eq!(m.seek(12, Whence::Set).unwrap(), 12);
        assert_eq!(m.capacity(), 12);
        assert!(matches!(m.seek(13, Whence::Set), Err(StreamError::OutOfSpace)));
    }

    #[test]
    fn test_from_parts_validation() {
        assert!(matches!(
            MemoryBackend::from_parts(None, 10, 0, MemoryOptions::default()),
            Err(StreamError::InvalidArgument(_))
        ));
        assert!(matches!(
            MemoryBackend::from_parts(None, 0, 3, MemoryOptions::default()),
            Err(StreamError::InvalidArgument(_))
        ));
        assert!(matches!(
            MemoryBackend::from_parts(Some(vec![0; 4]), 4, 5, MemoryOptions::default()),
            Err(StreamError::InvalidArgument(_))
        ));
        assert!(matches!(
            MemoryBackend::from_parts(Some(b"abcdef".to_vec()), 4, 2, MemoryOptions::default()),
            Err(StreamError::InvalidArgument(_))
        ));
        let m = MemoryBackend::from_parts(Some(b"xy".to_vec()), 8, 2, MemoryOptions::default())
            .unwrap();
        assert_eq!(m.capacity(), 8);
        assert_eq!(m.data(), b"xy");
    }

    #[test]
    fn test_rounding_overflow_is_invalid() {
        assert!(matches!(
            rounded_size(usize::MAX - 1, 4096),
            Err(StreamError::InvalidArgument(_))
        ));
        assert_eq!(rounded_size(1, 4096).unwrap(), 4096);
        assert_eq!(rounded_size(4096, 4096).unwrap(), 4096);
        assert_eq!(rounded_size(5, 0).unwrap(), 5);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut m = MemoryBackend::with_data(b"abc".to_vec(), MemoryOptions::default());
        assert!(m.close().is_ok());
        assert!(m.close().is_ok());
        assert_eq!(m.capacity(), 0);
    }

    #[test]
    fn test_snatch_returns_data() {
        let mut m = MemoryBackend::new(small(32));
        m.write(b"keep me").unwrap();
        assert_eq!(m.snatch_buffer().unwrap(), b"keep me");
        assert_eq!(m.capacity(), 0);
    }
}

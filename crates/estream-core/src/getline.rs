//! Line reading on top of peek/skip.
//!
//! Bytes are collected into a private memory-backed stream until a newline,
//! the length limit, or the end of input, then copied out in one piece.

use tracing::trace;

use crate::backend::{MemoryBackend, MemoryOptions, Whence};
use crate::config::BUFSIZ;
use crate::error::{Result, StreamError};
use crate::mode::OpenFlags;
use crate::stream::StreamCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEnd {
    Newline,
    LengthExhausted,
    InputExhausted,
}

impl StreamCore {
    /// Read one line, newline included, into `line`.
    ///
    /// `max_length` bounds the line like an `fgets` buffer size: at most
    /// `max_length - 1` bytes are stored. Zero means unbounded. Returns the
    /// line length; at end of input the line is empty and the EOF indicator
    /// is set. On error `line` is left untouched.
    pub fn read_line(&mut self, max_length: usize, line: &mut Vec<u8>) -> Result<usize> {
        let collected = match self.collect_line(max_length) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.indicators.err = true;
                return Err(e);
            }
        };
        line.clear();
        line.try_reserve_exact(collected.len())
            .map_err(|_| StreamError::OutOfMemory)?;
        line.extend_from_slice(&collected);
        Ok(line.len())
    }

    /// Read one line of any length.
    pub fn getline(&mut self, line: &mut Vec<u8>) -> Result<usize> {
        self.read_line(0, line)
    }

    fn collect_line(&mut self, max_length: usize) -> Result<Vec<u8>> {
        let backend = MemoryBackend::new(MemoryOptions::default());
        let mut acc = StreamCore::new(Box::new(backend), OpenFlags::READ_WRITE, BUFSIZ);
        let mut space_left = max_length;
        let mut line_size = 0usize;

        let end = loop {
            if max_length != 0 && space_left <= 1 {
                break LineEnd::LengthExhausted;
            }
            let data = self.peek()?;
            if data.is_empty() {
                break LineEnd::InputExhausted;
            }
            let mut window = data.len();
            if max_length != 0 {
                window = window.min(space_left - 1);
            }
            let data = &data[..window];
            let (take, found) = match data.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (window, false),
            };
            acc.write_all(&data[..take])?;
            self.skip(take)?;
            line_size += take;
            if max_length != 0 {
                space_left -= take;
            }
            if found {
                break LineEnd::Newline;
            }
        };
        trace!(fname = %self.fname(), bytes = line_size, end = ?end, "line collected");

        if line_size == 0 {
            if max_length != 1 {
                self.indicators.eof = true;
            }
            return Ok(Vec::new());
        }

        acc.seek(0, Whence::Set)?;
        let mut out = Vec::new();
        out.try_reserve_exact(line_size)
            .map_err(|_| StreamError::OutOfMemory)?;
        out.resize(line_size, 0);
        let mut filled = 0;
        while filled < line_size {
            match acc.read(&mut out[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        out.truncate(filled);
        acc.deinit()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::{MemoryBackend, MemoryOptions};
    use crate::mode::parse_mode;
    use crate::stream::StreamCore;

    fn reader(input: &[u8], capacity: usize) -> StreamCore {
        let backend = MemoryBackend::with_data(input.to_vec(), MemoryOptions::default());
        StreamCore::new(Box::new(backend), parse_mode("r").unwrap(), capacity)
    }

    #[test]
    fn lines_then_eof() {
        let mut s = reader(b"abc\nde", 64);
        let mut line = Vec::new();
        assert_eq!(s.getline(&mut line).unwrap(), 4);
        assert_eq!(line, b"abc\n");
        assert_eq!(s.getline(&mut line).unwrap(), 2);
        assert_eq!(line, b"de");
        assert!(s.is_eof());
        assert_eq!(s.getline(&mut line).unwrap(), 0);
        assert!(line.is_empty());
        assert!(s.is_eof());
    }

    #[test]
    fn empty_input_sets_eof() {
        let mut s = reader(b"", 64);
        let mut line = b"stale".to_vec();
        assert_eq!(s.getline(&mut line).unwrap(), 0);
        assert!(line.is_empty());
        assert!(s.is_eof());
    }

    #[test]
    fn line_longer_than_buffer() {
        let mut input = vec![b'x'; 100];
        input.push(b'\n');
        input.extend_from_slice(b"tail");
        let mut s = reader(&input, 16);
        let mut line = Vec::new();
        assert_eq!(s.getline(&mut line).unwrap(), 101);
        assert_eq!(line[..100], [b'x'; 100]);
        assert_eq!(s.getline(&mut line).unwrap(), 4);
        assert_eq!(line, b"tail");
    }

    #[test]
    fn max_length_truncates_and_resumes() {
        let mut s = reader(b"abcdef\n", 64);
        let mut line = Vec::new();
        assert_eq!(s.read_line(4, &mut line).unwrap(), 3);
        assert_eq!(line, b"abc");
        assert!(!s.is_eof());
        assert_eq!(s.read_line(0, &mut line).unwrap(), 4);
        assert_eq!(line, b"def\n");
    }

    #[test]
    fn max_length_one_reads_nothing_and_keeps_eof_clear() {
        let mut s = reader(b"abc", 64);
        let mut line = Vec::new();
        assert_eq!(s.read_line(1, &mut line).unwrap(), 0);
        assert!(!s.is_eof());
        assert_eq!(s.tell(), 0);
    }

    #[test]
    fn line_after_pushback() {
        let mut s = reader(b"bc\n", 64);
        s.unread(b"a").unwrap();
        let mut line = Vec::new();
        assert_eq!(s.getline(&mut line).unwrap(), 4);
        assert_eq!(line, b"abc\n");
    }
}

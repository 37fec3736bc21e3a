//! Stream sizing configuration.
//!
//! The default stream buffer capacity can be set via the `ESTREAM_BUFSIZ`
//! environment variable. It is read once and cached; later changes to the
//! environment are not observed. Values outside
//! `[MIN_BUFFER_SIZE, MAX_BUFFER_SIZE]` are clamped, unparsable values fall
//! back to [`BUFSIZ`].

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Default buffer size (POSIX BUFSIZ).
pub const BUFSIZ: usize = 8192;

/// Capacity of the pushback buffer.
pub const UNREAD_SIZE: usize = 16;

pub const MIN_BUFFER_SIZE: usize = 16;
pub const MAX_BUFFER_SIZE: usize = 1 << 24;

/// Name of the environment variable overriding [`BUFSIZ`].
pub const BUFSIZ_ENV: &str = "ESTREAM_BUFSIZ";

/// Sizes used when a stream or memory backend is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamConfig {
    /// Capacity of a stream's internal buffer. Fixed for the stream's lifetime.
    pub buffer_size: usize,
    /// Growth granularity of memory backends.
    pub mem_block_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: BUFSIZ,
            mem_block_size: BUFSIZ,
        }
    }
}

impl StreamConfig {
    /// Defaults with the buffer size taken from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            ..Self::default()
        }
    }
}

// 0 = unresolved, usize::MAX = resolving, anything else is the cached size.
static CACHED_BUFSIZ: AtomicUsize = AtomicUsize::new(0);

const SIZE_UNRESOLVED: usize = 0;
const SIZE_RESOLVING: usize = usize::MAX;

fn parse_buffer_size(raw: &str) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(n) => n.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE),
        Err(_) => BUFSIZ,
    }
}

/// Default stream buffer capacity (reads the env var on first call).
///
/// A concurrent caller arriving while another thread resolves the value gets
/// [`BUFSIZ`] rather than waiting.
#[must_use]
pub fn default_buffer_size() -> usize {
    let cached = CACHED_BUFSIZ.load(Ordering::Relaxed);
    if cached != SIZE_UNRESOLVED && cached != SIZE_RESOLVING {
        return cached;
    }
    if cached == SIZE_RESOLVING {
        return BUFSIZ;
    }

    if CACHED_BUFSIZ
        .compare_exchange(
            SIZE_UNRESOLVED,
            SIZE_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_BUFSIZ.load(Ordering::Relaxed);
        return if v != SIZE_UNRESOLVED && v != SIZE_RESOLVING {
            v
        } else {
            BUFSIZ
        };
    }

    let size = std::env::var(BUFSIZ_ENV)
        .map(|v| parse_buffer_size(&v))
        .unwrap_or(BUFSIZ);
    CACHED_BUFSIZ.store(size, Ordering::Release);
    size
}

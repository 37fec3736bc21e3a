//! # estream-core
//!
//! Buffered byte streams over pluggable backends.
//!
//! A [`Stream`] layers a fixed-size buffer, a buffering strategy, sticky
//! EOF/error indicators and a pushback area over any [`Backend`]: a memory
//! buffer, a file, or caller-supplied read/write/seek/close functions.
//! Streams register themselves in a [`StreamRegistry`] so they can be
//! flushed together. No `unsafe` code is permitted in this crate.

#![deny(unsafe_code)]

pub mod backend;
pub mod buffer;
pub mod config;
mod engine;
pub mod errno;
pub mod error;
mod getline;
pub mod metrics;
pub mod mode;
pub mod registry;
pub mod stream;

pub use backend::{
    Backend, Capabilities, FileBackend, MemoryBackend, MemoryOptions, ReaderBackend,
    WriterBackend, Whence,
};
pub use buffer::BufMode;
pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use metrics::{MetricsSnapshot, StreamMetrics, global_metrics};
pub use mode::{AccessMode, OpenFlags, parse_mode};
pub use registry::{RegistryGuard, StreamHandle, StreamRegistry};
pub use stream::{Indicators, Stream, StreamBuilder, StreamCore};

//! Atomic counters for stream observability.
//!
//! All counters use relaxed ordering; they are diagnostic, not
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global stream operation counters.
pub struct StreamMetrics {
    /// Streams created.
    pub opened: AtomicU64,
    /// Streams destroyed.
    pub closed: AtomicU64,
    /// Buffer refills from a backend.
    pub fills: AtomicU64,
    /// Buffer flushes that reached a backend.
    pub flushes: AtomicU64,
    /// Bytes returned by backend reads.
    pub bytes_read: AtomicU64,
    /// Bytes accepted by backend writes.
    pub bytes_written: AtomicU64,
    /// Backend seeks issued.
    pub seeks: AtomicU64,
    /// Operations that set a stream's error indicator.
    pub errors: AtomicU64,
}

impl StreamMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            fills: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            seeks: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            opened: Self::get(&self.opened),
            closed: Self::get(&self.closed),
            fills: Self::get(&self.fills),
            flushes: Self::get(&self.flushes),
            bytes_read: Self::get(&self.bytes_read),
            bytes_written: Self::get(&self.bytes_written),
            seeks: Self::get(&self.seeks),
            errors: Self::get(&self.errors),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all stream counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub opened: u64,
    pub closed: u64,
    pub fills: u64,
    pub flushes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub seeks: u64,
    pub errors: u64,
}

static GLOBAL_METRICS: StreamMetrics = StreamMetrics::new();

/// Access the global metrics singleton.
#[must_use]
pub fn global_metrics() -> &'static StreamMetrics {
    &GLOBAL_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = StreamMetrics::new();
        let snap = m.snapshot();
        assert_eq!(snap.fills, 0);
        assert_eq!(snap.errors, 0);
    }

    #[test]
    fn increment_and_add() {
        let m = StreamMetrics::new();
        StreamMetrics::inc(&m.fills);
        StreamMetrics::inc(&m.fills);
        StreamMetrics::add(&m.bytes_written, 300);
        let snap = m.snapshot();
        assert_eq!(snap.fills, 2);
        assert_eq!(snap.bytes_written, 300);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let m = StreamMetrics::new();
        StreamMetrics::inc(&m.seeks);
        let v = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(v["seeks"], 1);
        assert_eq!(v["opened"], 0);
    }
}

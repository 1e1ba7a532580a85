//! Memory accounting for engine-owned buffers.
//!
//! Every buffer created through an [`Engine`](crate::engine::Engine) reports
//! its allocations here, so leaks show up as a non-zero balance at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for buffer memory.
///
/// `Ordering::Relaxed` is enough: the counters are diagnostics only and no
/// other memory is published through them.
#[derive(Debug, Default)]
pub struct MemoryStats {
    /// Bytes currently held by live buffers
    allocated: AtomicU64,
    /// Highest value `allocated` has reached
    peak: AtomicU64,
    /// Number of times any buffer had to grow
    grows: AtomicU64,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently allocated by tracked buffers.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// High-water mark of [`allocated`](Self::allocated).
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// How many buffer growths happened.
    pub fn grows(&self) -> u64 {
        self.grows.load(Ordering::Relaxed)
    }

    pub(crate) fn record_alloc(&self, bytes: usize) {
        let now = self.allocated.fetch_add(bytes as u64, Ordering::Relaxed) + bytes as u64;
        self.peak.fetch_max(now, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_grow(&self, old: usize, new: usize) {
        self.grows.fetch_add(1, Ordering::Relaxed);
        if new >= old {
            self.record_alloc(new - old);
        } else {
            self.record_free(old - new);
        }
    }
}

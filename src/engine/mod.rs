//! Engine Context
//!
//! The [`Engine`] is the explicit `init → use → shutdown` value every batch,
//! connection and executor is created through. It carries:
//!
//! - the [`EngineConfig`] (buffer sizes, pair table size, error length)
//! - [`MemoryStats`] for every buffer created through it
//! - the text of the most recent setup or execution error
//! - a bounded pool of recycled batches
//!
//! ## Example
//!
//! ```
//! use redis_fanout::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::with_buffer_sizes(1024, 512));
//! let mut batch = engine.batch();
//! batch.write_set(b"greeting", b"hello").unwrap();
//! engine.recycle(batch);
//!
//! // nothing leaked
//! assert_eq!(engine.shutdown(), 0);
//! ```

pub mod config;
pub mod stats;

pub use config::EngineConfig;
pub use stats::MemoryStats;

use crate::batch::Batch;
use crate::connection::{Connection, ConnectionError};
use crate::executor::{Executor, ExecutorError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

/// Shared context for batches, connections and executors.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    stats: Arc<MemoryStats>,
    last_error: Mutex<Option<String>>,
    pool: Mutex<Vec<Batch>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        debug!(?config, "engine initialized");
        Self {
            config,
            stats: Arc::new(MemoryStats::new()),
            last_error: Mutex::new(None),
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Memory counters of every buffer created through this engine.
    pub fn stats(&self) -> &Arc<MemoryStats> {
        &self.stats
    }

    /// Returns an empty batch, reusing a recycled one when available.
    pub fn batch(&self) -> Batch {
        match lock(&self.pool).pop() {
            Some(batch) => {
                trace!("reusing pooled batch");
                batch
            }
            None => Batch::new(self),
        }
    }

    /// Resets `batch` and keeps it for a later [`batch`](Self::batch) call.
    ///
    /// Batches beyond the pool limit are dropped.
    pub fn recycle(&self, mut batch: Batch) {
        batch.reset();
        let mut pool = lock(&self.pool);
        if pool.len() < self.config.batch_pool_size {
            pool.push(batch);
        }
    }

    /// Number of batches waiting in the pool.
    pub fn pooled_batches(&self) -> usize {
        lock(&self.pool).len()
    }

    /// Creates a connection to `addr`, recording the error on failure.
    pub fn connection(&self, addr: &str) -> Result<Connection, ConnectionError> {
        Connection::new(self, addr).inspect_err(|e| self.set_last_error(e.to_string()))
    }

    /// Creates an executor, recording the error on failure.
    pub fn executor(&self) -> Result<Executor<'_>, ExecutorError> {
        Executor::new(self).inspect_err(|e| self.set_last_error(e.to_string()))
    }

    /// Text of the most recent setup or execution error.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub(crate) fn set_last_error(&self, mut message: String) {
        truncate_message(&mut message, self.config.max_error_len);
        debug!(error = %message, "last error");
        *lock(&self.last_error) = Some(message);
    }

    /// Bytes currently held by buffers created through this engine.
    pub fn allocated_bytes(&self) -> u64 {
        self.stats.allocated()
    }

    /// Drops pooled batches and reports the bytes still allocated.
    ///
    /// A non-zero result means some batch outlived the engine.
    pub fn shutdown(self) -> u64 {
        let pooled = {
            let mut pool = lock(&self.pool);
            let count = pool.len();
            pool.clear();
            count
        };

        let leaked = self.stats.allocated();
        if leaked > 0 {
            warn!(bytes = leaked, "engine shut down with live buffers");
        } else {
            debug!(
                pooled,
                peak = self.stats.peak(),
                grows = self.stats.grows(),
                "engine shut down"
            );
        }
        leaked
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shortens `text` to at most `max` bytes without splitting a character.
pub(crate) fn truncate_message(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

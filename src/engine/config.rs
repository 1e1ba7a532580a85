//! Engine Configuration
//!
//! Sizing and limits shared by every Batch, Connection and Executor created
//! through one [`Engine`](crate::engine::Engine).

/// Initial capacity of a Batch's read buffer (12 KB)
pub const DEFAULT_READ_BUFFER_SIZE: usize = 12 * 1024;

/// Initial capacity of a Batch's write buffer (4 KB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024;

/// Hard ceiling for any buffer (1 GB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024 * 1024;

/// Number of (connection, batch) pairs one Executor can drive
pub const DEFAULT_MAX_PAIRS: usize = 1024;

/// Maximum length of a composed error message
pub const DEFAULT_MAX_ERROR_LEN: usize = 255;

/// Recycled batches kept around for reuse
pub const DEFAULT_BATCH_POOL_SIZE: usize = 64;

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial read buffer capacity per batch (default: 12 KB)
    pub read_buffer_size: usize,

    /// Initial write buffer capacity per batch (default: 4 KB)
    pub write_buffer_size: usize,

    /// Growth ceiling for any buffer (default: 1 GB)
    pub max_buffer_size: usize,

    /// Size of the executor's pair table (default: 1024)
    pub max_pairs: usize,

    /// Error messages are truncated to this many bytes (default: 255)
    pub max_error_len: usize,

    /// Port used when an address carries none (default: 6379)
    pub default_port: u16,

    /// Upper bound on pooled batches (default: 64)
    pub batch_pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_pairs: DEFAULT_MAX_PAIRS,
            max_error_len: DEFAULT_MAX_ERROR_LEN,
            default_port: crate::DEFAULT_PORT,
            batch_pool_size: DEFAULT_BATCH_POOL_SIZE,
        }
    }
}

impl EngineConfig {
    /// Returns a config with custom initial buffer sizes.
    pub fn with_buffer_sizes(read_buffer_size: usize, write_buffer_size: usize) -> Self {
        Self {
            read_buffer_size,
            write_buffer_size,
            ..Self::default()
        }
    }
}

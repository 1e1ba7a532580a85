//! Growable Byte Buffer
//!
//! A contiguous byte region with a `position`/`limit` cursor pair, modelled on
//! the classic NIO buffer:
//!
//! ```text
//!  0                position            limit            capacity
//!  ├───────────────────┼──────────────────┼──────────────────┤
//!  │  already written  │    remaining     │  (read mode only)│
//!  └───────────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! - **Write mode** (`limit == capacity`): bytes are appended at `position`,
//!   growing the region by doubling until the request fits.
//! - **Read mode** (entered with [`Buffer::flip`]): `limit` marks the end of
//!   the valid data and `position` walks from 0 towards it.
//!
//! Replies keep `(offset, len)` pairs into a read buffer rather than pointers,
//! so growing never invalidates them: growth only appends room at the tail.

use crate::engine::config::DEFAULT_MAX_BUFFER_SIZE;
use crate::engine::MemoryStats;
use bytes::BytesMut;
use std::fmt::{self, Write as _};
use std::io::{self, Read, Write};
use std::sync::Arc;
use thiserror::Error;

/// Byte used to poison cleared memory in debug builds.
pub const POISON_BYTE: u8 = 0xEA;

/// Errors raised by buffer growth.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The buffer cannot grow far enough to hold the request
    #[error("out of memory: buffer needs {requested} bytes (max: {max})")]
    OutOfMemory { requested: usize, max: usize },
}

/// A growable byte region with a position/limit cursor pair.
pub struct Buffer {
    /// Backing storage; `data.len()` is the capacity
    data: BytesMut,
    /// Capacity at creation, restored by `clear`
    initial_capacity: usize,
    position: usize,
    limit: usize,
    max_capacity: usize,
    stats: Option<Arc<MemoryStats>>,
}

impl Buffer {
    /// Creates an untracked buffer of `size` bytes in write mode.
    pub fn new(size: usize) -> Self {
        Self::build(size, DEFAULT_MAX_BUFFER_SIZE, None)
    }

    /// Creates a buffer whose allocations are reported to `stats`.
    pub fn tracked(size: usize, max_capacity: usize, stats: Arc<MemoryStats>) -> Self {
        Self::build(size, max_capacity, Some(stats))
    }

    fn build(size: usize, max_capacity: usize, stats: Option<Arc<MemoryStats>>) -> Self {
        if let Some(stats) = &stats {
            stats.record_alloc(size);
        }
        let mut buffer = Self {
            data: BytesMut::zeroed(size),
            initial_capacity: size,
            position: 0,
            limit: size,
            max_capacity: max_capacity.max(size),
            stats,
        };
        if cfg!(debug_assertions) {
            buffer.fill(POISON_BYTE);
        }
        buffer
    }

    /// Next read/write offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor. Panics if it would pass the limit.
    pub fn set_position(&mut self, position: usize) {
        assert!(
            position <= self.limit,
            "position {} beyond limit {}",
            position,
            self.limit
        );
        self.position = position;
    }

    /// End of the valid region.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Sets the limit, pulling the position back if it lies beyond it.
    pub fn set_limit(&mut self, limit: usize) {
        assert!(
            limit <= self.capacity(),
            "limit {} beyond capacity {}",
            limit,
            self.capacity()
        );
        self.limit = limit;
        self.position = self.position.min(limit);
    }

    /// Currently allocated size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes between position and limit.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Switches from write mode to read mode.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Returns to an empty write-mode buffer, releasing any grown capacity.
    pub fn clear(&mut self) {
        let capacity = self.capacity();
        if capacity > self.initial_capacity {
            self.data = BytesMut::zeroed(self.initial_capacity);
            if let Some(stats) = &self.stats {
                stats.record_free(capacity - self.initial_capacity);
            }
        }
        self.position = 0;
        self.limit = self.capacity();
    }

    /// Overwrites the whole allocation with `byte`.
    pub fn fill(&mut self, byte: u8) {
        self.data.fill(byte);
    }

    /// Grows the buffer until at least `min_remaining` bytes fit after the
    /// position. Only valid in write mode.
    pub fn ensure_remaining(&mut self, min_remaining: usize) -> Result<(), BufferError> {
        assert_eq!(
            self.limit,
            self.capacity(),
            "buffer must be in write mode to grow"
        );
        if self.remaining() >= min_remaining {
            return Ok(());
        }

        let oom = |requested| BufferError::OutOfMemory {
            requested,
            max: self.max_capacity,
        };
        let needed = self
            .position
            .checked_add(min_remaining)
            .ok_or_else(|| oom(usize::MAX))?;
        if needed > self.max_capacity {
            return Err(oom(needed));
        }

        let mut new_capacity = self.limit.max(1);
        while new_capacity < needed {
            new_capacity = new_capacity.checked_mul(2).unwrap_or(usize::MAX);
        }
        let new_capacity = new_capacity.min(self.max_capacity);

        let old_capacity = self.capacity();
        self.data.resize(new_capacity, 0);
        if let Some(stats) = &self.stats {
            stats.record_grow(old_capacity, new_capacity);
        }
        self.limit = new_capacity;
        Ok(())
    }

    /// Appends `bytes` at the position, growing as needed.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.ensure_remaining(bytes.len())?;
        let end = self.position + bytes.len();
        self.data[self.position..end].copy_from_slice(bytes);
        self.position = end;
        Ok(())
    }

    /// Writes the remaining bytes to `sink` once, advancing the position by
    /// what was actually sent. `WouldBlock` and every other I/O error are
    /// returned unchanged.
    pub fn send<W: Write>(&mut self, sink: &mut W) -> io::Result<usize> {
        let written = sink.write(&self.data[self.position..self.limit])?;
        self.position += written;
        Ok(written)
    }

    /// Reads once from `source` into the free space after the position.
    ///
    /// Keeps at least an eighth of the capacity free before reading, growing
    /// the tail if the buffer is nearly full. A return of `Ok(0)` means the
    /// peer closed the stream.
    pub fn recv<R: Read>(&mut self, source: &mut R) -> io::Result<usize> {
        let headroom = (self.capacity() / 8).max(1);
        self.ensure_remaining(headroom)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        let read = source.read(&mut self.data[self.position..self.limit])?;
        self.position += read;
        Ok(read)
    }

    /// Bytes written so far (write mode), i.e. `[0, position)`.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.position]
    }

    /// Bytes between position and limit.
    #[inline]
    pub fn readable(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Borrows `len` bytes starting at `offset`.
    #[inline]
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Hex/ASCII dump of the first `limit` bytes, 16 per row.
    pub fn dump(&self, limit: usize) -> String {
        let end = limit.min(self.capacity());
        let mut out = format!(
            "buffer cap: {}, limit: {}, pos: {}\n",
            self.capacity(),
            self.limit,
            self.position
        );
        for row in self.data[..end].chunks(16) {
            for byte in row {
                let _ = write!(out, "{:02X} ", byte);
            }
            for _ in row.len()..16 {
                out.push_str("   ");
            }
            for &byte in row {
                out.push(if byte.is_ascii_graphic() || byte == b' ' {
                    byte as char
                } else {
                    '.'
                });
            }
            out.push('\n');
        }
        out
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(stats) = &self.stats {
            stats.record_free(self.capacity());
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .field("initial_capacity", &self.initial_capacity)
            .finish()
    }
}

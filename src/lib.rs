//! # redis-fanout - A Non-Blocking Redis Client Engine
//!
//! redis-fanout sends batches of Redis commands to many independent servers
//! at once, without a thread per connection, and returns every reply in the
//! order its command was written.
//!
//! ## Features
//!
//! - **Fan-out**: one executor round drives any number of servers over a
//!   single readiness poller (mio)
//! - **One deadline**: a round always returns in bounded time; stragglers are
//!   aborted, not left hanging
//! - **Every command answered**: failures become error replies, one per
//!   pending command, so callers never special-case a missing reply
//! - **Zero-copy replies**: replies point into the batch's read buffer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Engine                                    │
//! │         config · memory stats · last error · batch pool                 │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │                        Executor round                             │  │
//! │  │                 mio::Poll + shared deadline                       │  │
//! │  └──────────┬──────────────────────┬──────────────────────┬─────────┘  │
//! │             │                      │                      │            │
//! │             ▼                      ▼                      ▼            │
//! │  ┌────────────────────┐ ┌────────────────────┐ ┌────────────────────┐  │
//! │  │ Connection ⇄ Batch │ │ Connection ⇄ Batch │ │ Connection ⇄ Batch │  │
//! │  │  socket  · parser  │ │  socket  · parser  │ │  socket  · parser  │  │
//! │  │  write / read buf  │ │  write / read buf  │ │  write / read buf  │  │
//! │  └────────────────────┘ └────────────────────┘ └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use redis_fanout::{Engine, ExecuteOutcome};
//! use std::time::Duration;
//!
//! let engine = Engine::default();
//! let mut connection = engine.connection("127.0.0.1:6379").unwrap();
//! let mut batch = engine.batch();
//! batch.write_set(b"foo", b"bar").unwrap();
//! batch.write_get(b"foo").unwrap();
//!
//! let mut executor = engine.executor().unwrap();
//! executor.add(&mut connection, &mut batch).unwrap();
//! match executor.execute(Duration::from_millis(500)) {
//!     ExecuteOutcome::Completed => {}
//!     other => eprintln!("round ended early: {:?}", other),
//! }
//!
//! while let Some(reply) = batch.next_reply() {
//!     println!("{} {} {:?}", reply.depth, reply.kind, reply.as_str());
//! }
//! engine.recycle(batch);
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: buffers, the reply tree and the resumable reply parser
//! - [`batch`]: command batches, command encoding and reply traversal
//! - [`connection`]: the per-server non-blocking state machine
//! - [`executor`]: multiplexing pairs under one deadline
//! - [`engine`]: configuration, memory accounting, batch pooling
//!
//! ## Design Highlights
//!
//! ### Ownership instead of back-pointers
//!
//! A connection never stores the batch or executor it serves. The executor
//! holds `&mut` borrows of each pair for one round and passes them down on
//! every event, so registering the same connection or batch twice in one
//! round does not compile.
//!
//! ### Resumable parsing
//!
//! The reply parser keeps its state between calls. Replies split across any
//! number of reads resume at the exact byte where the previous read ended.

pub mod batch;
pub mod connection;
pub mod engine;
pub mod executor;
pub mod protocol;

// Re-export commonly used types for convenience
pub use batch::{Batch, Replies, ReplyEntry};
pub use connection::{Connection, ConnectionError, ConnectionState, Endpoint};
pub use engine::{Engine, EngineConfig, MemoryStats};
pub use executor::{ExecuteOutcome, Executor, ExecutorError};
pub use protocol::{Buffer, BufferError, ParseError, Reply, ReplyKind, ReplyParser};

/// The default Redis port, used when an address carries none
pub const DEFAULT_PORT: u16 = 6379;

/// Version of redis-fanout
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

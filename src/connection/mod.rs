//! Server Connections
//!
//! This module manages the client side of one server endpoint. A
//! [`Connection`] outlives any single executor round: it keeps its socket
//! open between rounds and silently reconnects after a failure.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────┐
//!                │        Executor round        │
//!                └──────────────┬───────────────┘
//!                               │ execute_start / handle_event
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Connection                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Connect     │───>│ Send batch  │───>│ Read bytes  │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Parse reply │        │
//! │                                      │ push → batch│        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use redis_fanout::{Connection, ConnectionState, Engine};
//!
//! let engine = Engine::default();
//! let connection = Connection::new(&engine, "127.0.0.1:6380").unwrap();
//! assert_eq!(connection.state(), ConnectionState::Closed);
//! assert_eq!(connection.endpoint().to_string(), "127.0.0.1:6380");
//! ```

pub mod address;
pub mod handler;

// Re-export commonly used types
pub use address::Endpoint;
pub use handler::{Connection, ConnectionError, ConnectionState};

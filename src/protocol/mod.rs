//! RESP Reply Protocol
//!
//! This module holds the byte-level half of the engine: the growable buffers
//! that carry requests and replies, the reply tree, and the resumable parser
//! that turns received bytes into replies.
//!
//! ## Modules
//!
//! - `buffer`: `Buffer`, a growable byte region with a position/limit cursor
//! - `reply`: `ReplyKind` and `Reply`, the parsed value tree
//! - `parser`: `ReplyParser`, a byte-at-a-time resumable state machine
//!
//! ## Example
//!
//! ```
//! use redis_fanout::protocol::{Buffer, ReplyKind, ReplyParser};
//!
//! let mut buffer = Buffer::new(64);
//! buffer.write(b"*2\r\n$1\r\na\r\n$-1\r\n").unwrap();
//!
//! let mut parser = ReplyParser::new();
//! let reply = parser.execute(buffer.filled()).unwrap().unwrap();
//! assert_eq!(reply.kind(), ReplyKind::MultiBulk);
//! assert_eq!(reply.children().len(), 2);
//! ```

pub mod buffer;
pub mod parser;
pub mod reply;

// Re-export commonly used types for convenience
pub use buffer::{Buffer, BufferError, POISON_BYTE};
pub use parser::{ParseError, ParseResult, ReplyParser, MAX_BULK_SIZE, MAX_MULTIBULK_LEN};
pub use reply::{Reply, ReplyKind, ReplySource};

/// Line terminator used by every protocol element
pub const CRLF: &[u8] = b"\r\n";

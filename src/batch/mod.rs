//! Command Batches
//!
//! A [`Batch`] is the unit of work handed to a connection: the caller writes
//! commands into it, an executor round sends them, and the replies come back
//! into the same batch in command order.
//!
//! ## Lifecycle
//!
//! ```text
//!   write()/write_command()        Executor::execute()         next_reply()
//!  ┌───────────────────────┐     ┌────────────────────┐     ┌──────────────┐
//!  │ pending += n          │────>│ send, parse, push  │────>│ drain, then  │
//!  │ write buffer grows    │     │ or abort() on fail │     │ reset()      │
//!  └───────────────────────┘     └────────────────────┘     └──────────────┘
//! ```
//!
//! Whatever happens during execution, every pending command ends up with a
//! reply: a server reply, or an error reply carrying the abort message.
//!
//! ## Modules
//!
//! - `queue`: the `Batch` itself
//! - `cursor`: depth-first reply traversal (`next_reply`, `replies`)
//! - `commands`: multibulk request encoding helpers

pub mod commands;
pub mod cursor;
pub mod queue;

pub use cursor::{Replies, ReplyEntry};
pub use queue::Batch;

//! Executor Rounds
//!
//! An [`Executor`] multiplexes any number of (connection, batch) pairs over
//! one readiness poller, under one shared deadline. Nothing blocks except the
//! poll itself, and the poll never waits past the deadline.
//!
//! ## One round
//!
//! ```text
//!   add(conn, batch) ×N
//!          │
//!          ▼
//!   execute(timeout) ── execute_start on every pair (first write, connect)
//!          │
//!          ▼
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ while registrations are outstanding and batches pending: │
//!   │   deadline passed?  → TIMEOUT to every unfinished pair   │
//!   │   poll(remaining)   → READ / WRITE to the ready pairs    │
//!   └──────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//!   Completed | TimedOut | Error(detail)
//! ```
//!
//! ## Modules
//!
//! - `interest`: per-pair registrations and the `Readiness` bit set
//! - `dispatch`: the `Executor` and its outcome

pub mod dispatch;
pub mod interest;

pub use dispatch::{ExecuteOutcome, Executor, ExecutorError};
pub use interest::Readiness;

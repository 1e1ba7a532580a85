//! The Executor: many pairs, one poller, one deadline.

use crate::batch::Batch;
use crate::connection::Connection;
use crate::engine::Engine;
use crate::executor::interest::{Interests, Readiness};
use mio::{Events, Poll};
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors returned synchronously by the executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The pair table is full
    #[error("Executor is full, max = {max}")]
    Full { max: usize },

    /// The readiness poller could not be created
    #[error("could not create poller: {0}")]
    Poll(#[from] io::Error),
}

/// How an [`Executor::execute`] call ended.
///
/// Whatever the outcome, every batch ends up fully answered: timed-out or
/// failed pairs get an error reply per pending command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Every pair finished (answered or aborted) before the deadline
    Completed,
    /// The deadline passed; stragglers were aborted
    TimedOut,
    /// Polling failed; all unfinished pairs were aborted
    Error(String),
}

impl ExecuteOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecuteOutcome::Completed)
    }
}

struct Pair<'a> {
    connection: &'a mut Connection,
    batch: &'a mut Batch,
}

/// Drives a set of (connection, batch) pairs to completion.
///
/// The executor mutably borrows each connection and batch it is given, so
/// the same connection or batch cannot be added twice to one round.
///
/// # Example
///
/// ```no_run
/// use redis_fanout::{Engine, ExecuteOutcome};
/// use std::time::Duration;
///
/// let engine = Engine::default();
/// let mut first = engine.connection("10.0.0.1:6379").unwrap();
/// let mut second = engine.connection("10.0.0.2:6379").unwrap();
/// let mut batch_a = engine.batch();
/// let mut batch_b = engine.batch();
/// batch_a.write_get(b"user:1").unwrap();
/// batch_b.write_get(b"user:2").unwrap();
///
/// let mut executor = engine.executor().unwrap();
/// executor.add(&mut first, &mut batch_a).unwrap();
/// executor.add(&mut second, &mut batch_b).unwrap();
/// let outcome = executor.execute(Duration::from_millis(500));
/// assert_eq!(outcome, ExecuteOutcome::Completed);
///
/// while let Some(reply) = batch_a.next_reply() {
///     println!("{} {} {:?}", reply.depth, reply.kind, reply.as_str());
/// }
/// ```
pub struct Executor<'a> {
    engine: &'a Engine,
    poll: Poll,
    interests: Interests,
    pairs: Vec<Pair<'a>>,
}

impl<'a> Executor<'a> {
    /// Creates an executor with an empty pair table.
    pub fn new(engine: &'a Engine) -> Result<Self, ExecutorError> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        Ok(Self {
            engine,
            poll,
            interests: Interests::new(registry),
            pairs: Vec::new(),
        })
    }

    /// Registers a pair for the next [`execute`](Self::execute).
    pub fn add(
        &mut self,
        connection: &'a mut Connection,
        batch: &'a mut Batch,
    ) -> Result<(), ExecutorError> {
        let max = self.engine.config().max_pairs;
        if self.pairs.len() >= max {
            let err = ExecutorError::Full { max };
            self.engine.set_last_error(err.to_string());
            return Err(err);
        }
        self.pairs.push(Pair { connection, batch });
        self.interests.add_slot();
        Ok(())
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Runs every pair until all batches are answered or `timeout` passes.
    pub fn execute(mut self, timeout: Duration) -> ExecuteOutcome {
        let started = Instant::now();
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + Duration::from_secs(365 * 24 * 60 * 60));
        let mut events = Events::with_capacity(self.pairs.len().max(1));
        let mut ready_events: Vec<(usize, Readiness)> = Vec::with_capacity(self.pairs.len());

        for (ordinal, pair) in self.pairs.iter_mut().enumerate() {
            if pair.batch.has_pending_commands() {
                pair.connection
                    .execute_start(pair.batch, ordinal, &mut self.interests);
            }
        }

        let outcome = loop {
            if self.interests.outstanding() == 0 || !self.any_pending() {
                break ExecuteOutcome::Completed;
            }

            let now = Instant::now();
            if now >= deadline {
                self.dispatch_all(Readiness::TIMEOUT);
                break ExecuteOutcome::TimedOut;
            }

            if let Err(e) = self.poll.poll(&mut events, Some(deadline - now)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(error = %e, "readiness poll failed");
                self.dispatch_all(Readiness::ERROR);
                break ExecuteOutcome::Error(format!("Execute poll error: {}", e));
            }

            ready_events.clear();
            for event in events.iter() {
                ready_events.push((event.token().0, Readiness::from_event(event)));
            }
            for &(ordinal, ready) in &ready_events {
                let hit = self.interests.consume(ordinal, ready);
                if hit.is_empty() {
                    continue;
                }
                let Some(pair) = self.pairs.get_mut(ordinal) else {
                    continue;
                };
                if pair.batch.has_pending_commands() {
                    pair.connection
                        .handle_event(hit, pair.batch, ordinal, &mut self.interests);
                }
            }
        };

        for (ordinal, pair) in self.pairs.iter_mut().enumerate() {
            pair.connection.finish_round(ordinal, &mut self.interests);
        }

        match &outcome {
            ExecuteOutcome::Completed => {}
            ExecuteOutcome::TimedOut => self.engine.set_last_error("Execute timeout".into()),
            ExecuteOutcome::Error(detail) => self.engine.set_last_error(detail.clone()),
        }
        debug!(
            pairs = self.pairs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            outcome = ?outcome,
            "execute finished"
        );
        outcome
    }

    fn any_pending(&self) -> bool {
        self.pairs.iter().any(|pair| pair.batch.has_pending_commands())
    }

    /// Delivers `event` to every pair that still waits for replies.
    fn dispatch_all(&mut self, event: Readiness) {
        for (ordinal, pair) in self.pairs.iter_mut().enumerate() {
            self.interests.take_all(ordinal);
            if pair.batch.has_pending_commands() {
                pair.connection
                    .handle_event(event, pair.batch, ordinal, &mut self.interests);
            }
        }
    }
}

//! The Batch: commands out, replies in.
//!
//! A batch pairs a write buffer of encoded commands with a read buffer of
//! raw replies. Replies complete in the order the commands were written,
//! so the reply queue is a plain FIFO.

use crate::batch::cursor::{ReplyCursor, ReplyEntry, Replies};
use crate::engine::Engine;
use crate::protocol::{Buffer, BufferError, Reply, ReplySource, POISON_BYTE};
use tracing::debug;

/// One set of commands destined for one connection, plus their replies.
///
/// # Example
///
/// ```
/// use redis_fanout::{Batch, Engine};
///
/// let engine = Engine::default();
/// let mut batch = Batch::new(&engine);
///
/// // A command may be written in several fragments; only the last one counts
/// batch.write(b"GET ", 0).unwrap();
/// batch.write(b"foo\r\n", 1).unwrap();
/// assert_eq!(batch.pending_commands(), 1);
/// ```
#[derive(Debug)]
pub struct Batch {
    write_buffer: Buffer,
    read_buffer: Buffer,
    /// Commands written but not yet answered
    pending: usize,
    replies: Vec<Reply>,
    cursor: ReplyCursor,
    /// Abort message shared by every synthesized error reply
    error: Option<String>,
    /// The write buffer was flipped for sending; cleared by `reset`
    sent: bool,
}

impl Batch {
    /// Creates an empty batch whose buffers are sized and tracked by `engine`.
    pub fn new(engine: &Engine) -> Self {
        let config = engine.config();
        let stats = engine.stats();
        Self {
            write_buffer: Buffer::tracked(
                config.write_buffer_size,
                config.max_buffer_size,
                stats.clone(),
            ),
            read_buffer: Buffer::tracked(
                config.read_buffer_size,
                config.max_buffer_size,
                stats.clone(),
            ),
            pending: 0,
            replies: Vec::new(),
            cursor: ReplyCursor::default(),
            error: None,
            sent: false,
        }
    }

    /// Appends raw protocol bytes and counts `commands` more pending commands.
    ///
    /// The count is only bumped when the bytes were stored.
    ///
    /// # Panics
    ///
    /// Panics if the batch went through an executor round since the last
    /// [`reset`](Self::reset).
    pub fn write(&mut self, bytes: &[u8], commands: usize) -> Result<(), BufferError> {
        self.assert_writable();
        self.write_buffer.write(bytes)?;
        self.pending += commands;
        Ok(())
    }

    pub(crate) fn assert_writable(&self) {
        assert!(!self.sent, "batch was executed; call reset() first");
    }

    /// Switches the write buffer to read mode for sending.
    pub(crate) fn start_sending(&mut self) {
        if !self.sent {
            self.write_buffer.flip();
            self.sent = true;
        }
    }

    /// True while some written command has no reply yet.
    #[inline]
    pub fn has_pending_commands(&self) -> bool {
        self.pending > 0
    }

    /// Number of commands still waiting for a reply.
    pub fn pending_commands(&self) -> usize {
        self.pending
    }

    /// Number of completed top-level replies.
    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }

    /// Completed top-level replies, in command order.
    pub fn reply_list(&self) -> &[Reply] {
        &self.replies
    }

    /// Records a completed top-level reply for the oldest pending command.
    pub(crate) fn push_reply(&mut self, reply: Reply) {
        assert!(self.pending > 0, "reply received without a pending command");
        self.pending -= 1;
        self.replies.push(reply);
    }

    /// Fails every pending command with `message`.
    ///
    /// Each pending command gets one error reply carrying the message.
    ///
    /// # Panics
    ///
    /// Panics if the batch was already aborted.
    pub fn abort(&mut self, message: impl Into<String>) {
        assert!(self.error.is_none(), "batch already aborted");
        let message = message.into();
        debug!(pending = self.pending, error = %message, "aborting batch");

        let len = message.len();
        self.error = Some(message);
        while self.has_pending_commands() {
            self.push_reply(Reply::aborted(len));
        }
    }

    /// The abort message, if the batch was aborted.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }

    /// Borrows the value bytes of a reply owned by this batch.
    ///
    /// Returns `None` for nil and multibulk replies.
    pub fn reply_data(&self, reply: &Reply) -> Option<&[u8]> {
        match reply.source() {
            ReplySource::None => None,
            ReplySource::Read => Some(self.read_buffer.slice(reply.offset(), reply.len())),
            ReplySource::Abort => self
                .error
                .as_deref()
                .map(|text| &text.as_bytes()[reply.offset()..reply.offset() + reply.len()]),
        }
    }

    /// Returns the next reply in depth-first order, or `None` once drained.
    ///
    /// Top-level replies come at depth 1; the children of a multibulk follow
    /// their parent at depth 2.
    pub fn next_reply(&mut self) -> Option<ReplyEntry<'_>> {
        let (depth, reply) = self.cursor.advance(&self.replies)?;
        Some(ReplyEntry::new(self, depth, reply))
    }

    /// Walks all replies from the start without moving `next_reply`'s cursor.
    pub fn replies(&self) -> Replies<'_> {
        Replies::new(self)
    }

    /// Empties the batch for another round, keeping its buffers.
    ///
    /// Grown buffers shrink back to their initial size. Debug builds
    /// overwrite both buffers with [`POISON_BYTE`].
    pub fn reset(&mut self) {
        self.write_buffer.clear();
        self.read_buffer.clear();
        if cfg!(debug_assertions) {
            self.write_buffer.fill(POISON_BYTE);
            self.read_buffer.fill(POISON_BYTE);
        }
        self.pending = 0;
        self.replies.clear();
        self.cursor = ReplyCursor::default();
        self.error = None;
        self.sent = false;
    }

    pub(crate) fn write_buffer(&self) -> &Buffer {
        &self.write_buffer
    }

    pub(crate) fn write_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.write_buffer
    }

    pub(crate) fn read_buffer(&self) -> &Buffer {
        &self.read_buffer
    }

    pub(crate) fn read_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.read_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::protocol::{ReplyKind, ReplyParser};

    fn small_engine() -> Engine {
        Engine::new(EngineConfig::with_buffer_sizes(64, 64))
    }

    /// Feeds `bytes` as if received from the server.
    fn deliver(batch: &mut Batch, bytes: &[u8]) {
        batch.read_buffer_mut().write(bytes).unwrap();
        let mut parser = ReplyParser::new();
        while let Some(reply) = parser.execute(batch.read_buffer().filled()).unwrap() {
            batch.push_reply(reply);
        }
    }

    #[test]
    fn test_pending_count_follows_writes_and_replies() {
        let engine = small_engine();
        let mut batch = Batch::new(&engine);
        assert!(!batch.has_pending_commands());

        batch.write(b"SET foo 3\r\nbar\r\n", 1).unwrap();
        batch.write(b"GET ", 0).unwrap();
        batch.write(b"foo\r\n", 1).unwrap();
        assert_eq!(batch.pending_commands(), 2);

        deliver(&mut batch, b"+OK\r\n");
        assert_eq!(batch.pending_commands(), 1);
        assert!(batch.has_pending_commands());
    }

    #[test]
    fn test_replies_in_write_order() {
        let engine = small_engine();
        let mut batch = Batch::new(&engine);
        batch.write(b"SET foo 3\r\nbar\r\nGET foo\r\n", 2).unwrap();
        deliver(&mut batch, b"+OK\r\n$3\r\nbar\r\n");

        assert!(!batch.has_pending_commands());
        let first = batch.next_reply().unwrap();
        assert_eq!((first.depth, first.kind), (1, ReplyKind::Ok));
        assert_eq!(first.data, Some(&b"OK"[..]));
        let second = batch.next_reply().unwrap();
        assert_eq!((second.depth, second.kind), (1, ReplyKind::Bulk));
        assert_eq!(second.data, Some(&b"bar"[..]));
        assert!(batch.next_reply().is_none());
    }

    #[test]
    fn test_abort_fills_every_pending_command() {
        let engine = small_engine();
        let mut batch = Batch::new(&engine);
        batch.write(b"PING\r\nPING\r\nPING\r\n", 3).unwrap();
        deliver(&mut batch, b"+PONG\r\n");

        batch.abort("Connection error read eof [addr: 127.0.0.1:6379]");
        assert!(!batch.has_pending_commands());
        assert_eq!(batch.reply_count(), 3);
        assert_eq!(
            batch.error(),
            Some("Connection error read eof [addr: 127.0.0.1:6379]")
        );

        let kinds: Vec<_> = batch.replies().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![ReplyKind::Ok, ReplyKind::Error, ReplyKind::Error]
        );
        for entry in batch.replies().skip(1) {
            assert_eq!(entry.as_str(), batch.error());
        }
    }

    #[test]
    fn test_abort_without_pending_keeps_message() {
        let engine = small_engine();
        let mut batch = Batch::new(&engine);
        batch.abort("nothing to do");
        assert_eq!(batch.reply_count(), 0);
        assert!(batch.is_aborted());
    }

    #[test]
    #[should_panic(expected = "already aborted")]
    fn test_double_abort_panics() {
        let engine = small_engine();
        let mut batch = Batch::new(&engine);
        batch.write(b"PING\r\n", 1).unwrap();
        batch.abort("first");
        batch.abort("second");
    }

    #[test]
    fn test_failed_write_does_not_count() {
        let mut config = EngineConfig::with_buffer_sizes(8, 8);
        config.max_buffer_size = 16;
        let engine = Engine::new(config);
        let mut batch = Batch::new(&engine);
        assert!(batch.write(&[b'x'; 17], 1).is_err());
        assert_eq!(batch.pending_commands(), 0);
    }

    #[test]
    fn test_reset_allows_reuse() {
        let engine = small_engine();
        let mut batch = Batch::new(&engine);
        batch.write(&[b'x'; 200], 1).unwrap();
        batch.abort("gone");
        assert!(batch.write_buffer().capacity() > 64);

        batch.reset();
        assert_eq!(batch.write_buffer().capacity(), 64);
        assert_eq!(batch.write_buffer().position(), 0);
        assert_eq!(batch.read_buffer().position(), 0);
        assert_eq!(batch.reply_count(), 0);
        assert!(batch.error().is_none());
        assert!(batch.next_reply().is_none());

        batch.write(b"PING\r\n", 1).unwrap();
        deliver(&mut batch, b"+PONG\r\n");
        assert_eq!(batch.next_reply().unwrap().as_str(), Some("PONG"));
    }

    #[test]
    #[should_panic(expected = "call reset() first")]
    fn test_write_after_round_needs_reset() {
        let engine = small_engine();
        let mut batch = Batch::new(&engine);
        batch.write(b"PING\r\n", 1).unwrap();
        batch.start_sending();
        deliver(&mut batch, b"+PONG\r\n");
        batch.write(b"PING\r\n", 1).unwrap();
    }

    #[test]
    fn test_write_after_reset_succeeds() {
        let engine = small_engine();
        let mut batch = Batch::new(&engine);
        batch.write(b"PING\r\n", 1).unwrap();
        batch.start_sending();
        assert_eq!(batch.write_buffer().remaining(), 6);

        batch.reset();
        batch.write(b"ECHO a\r\n", 1).unwrap();
        assert_eq!(batch.write_buffer().filled(), b"ECHO a\r\n");
    }

    #[test]
    fn test_buffers_are_tracked_by_engine() {
        let engine = small_engine();
        let batch = Batch::new(&engine);
        assert_eq!(engine.allocated_bytes(), 128);
        drop(batch);
        assert_eq!(engine.allocated_bytes(), 0);
    }
}

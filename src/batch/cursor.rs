//! Depth-reporting reply traversal.
//!
//! Multibulk replies cannot nest, so the traversal stack is at most two
//! levels deep: the index of the next top-level reply, plus the position
//! inside the multibulk currently being walked.

use crate::batch::queue::Batch;
use crate::protocol::{Reply, ReplyKind};
use std::str;

/// Position of a depth-first walk over a batch's replies.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReplyCursor {
    /// Index of the next top-level reply
    next: usize,
    /// `(parent index, next child index)` while inside a multibulk
    child: Option<(usize, usize)>,
}

impl ReplyCursor {
    /// Steps to the next reply, returning it with its depth.
    pub(crate) fn advance<'r>(&mut self, replies: &'r [Reply]) -> Option<(usize, &'r Reply)> {
        if let Some((parent, index)) = self.child {
            let children = replies[parent].children();
            if index < children.len() {
                self.child = Some((parent, index + 1));
                return Some((2, &children[index]));
            }
            self.child = None;
        }

        let index = self.next;
        let reply = replies.get(index)?;
        self.next += 1;
        if reply.kind() == ReplyKind::MultiBulk && !reply.children().is_empty() {
            self.child = Some((index, 0));
        }
        Some((1, reply))
    }
}

/// One step of a reply traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyEntry<'a> {
    /// 1 for top-level replies, 2 for multibulk children
    pub depth: usize,
    pub kind: ReplyKind,
    /// Value bytes; `None` for nil and multibulk replies
    pub data: Option<&'a [u8]>,
    /// Value length, or child count for a multibulk
    pub len: usize,
}

impl<'a> ReplyEntry<'a> {
    pub(crate) fn new(batch: &'a Batch, depth: usize, reply: &Reply) -> Self {
        Self {
            depth,
            kind: reply.kind(),
            data: batch.reply_data(reply),
            len: reply.len(),
        }
    }

    /// The value as UTF-8 text.
    pub fn as_str(&self) -> Option<&'a str> {
        self.data.and_then(|data| str::from_utf8(data).ok())
    }

    /// The value of an `Integer` reply.
    pub fn as_integer(&self) -> Option<i64> {
        if self.kind != ReplyKind::Integer {
            return None;
        }
        self.as_str()?.parse().ok()
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReplyKind::Error
    }
}

/// Iterator over a batch's replies in `next_reply` order.
#[derive(Debug)]
pub struct Replies<'a> {
    batch: &'a Batch,
    cursor: ReplyCursor,
}

impl<'a> Replies<'a> {
    pub(crate) fn new(batch: &'a Batch) -> Self {
        Self {
            batch,
            cursor: ReplyCursor::default(),
        }
    }
}

impl<'a> Iterator for Replies<'a> {
    type Item = ReplyEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, reply) = self.cursor.advance(self.batch.reply_list())?;
        Some(ReplyEntry::new(self.batch, depth, reply))
    }
}

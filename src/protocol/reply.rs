//! Reply Tree
//!
//! A [`Reply`] describes one parsed protocol value without copying it: scalar
//! replies record where their bytes live (`source` + `offset` + `len`), and a
//! multibulk reply owns its ordered children.
//!
//! ## Reply kinds
//!
//! | Wire                | Kind           | `len`             |
//! |---------------------|----------------|-------------------|
//! | `+OK\r\n`           | `Ok`           | text length       |
//! | `-ERR ...\r\n`      | `Error`        | text length       |
//! | `:42\r\n`           | `Integer`      | digit count       |
//! | `$3\r\nbar\r\n`     | `Bulk`         | value length      |
//! | `$-1\r\n`           | `BulkNil`      | 0                 |
//! | `*2\r\n...`         | `MultiBulk`    | child count       |
//! | `*-1\r\n`           | `MultiBulkNil` | 0                 |

use std::fmt;

/// Upper bound on children reserved up front for one multibulk reply.
const MAX_PREALLOCATED_CHILDREN: usize = 1024;

/// The type of a reply.
///
/// The discriminants are the stable integer codes exposed to bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReplyKind {
    /// `-<text>\r\n`, or an error synthesized by an aborted batch
    Error = -1,
    /// No reply
    None = 0,
    /// `+<text>\r\n`
    Ok = 1,
    /// `$-1\r\n`
    BulkNil = 2,
    /// `$<n>\r\n<n bytes>\r\n`
    Bulk = 3,
    /// `*-1\r\n`
    MultiBulkNil = 4,
    /// `*<n>\r\n` followed by n bulk children
    MultiBulk = 5,
    /// `:<digits>\r\n`
    Integer = 6,
}

impl ReplyKind {
    /// Integer code of this kind.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Looks a kind up by its integer code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(ReplyKind::Error),
            0 => Some(ReplyKind::None),
            1 => Some(ReplyKind::Ok),
            2 => Some(ReplyKind::BulkNil),
            3 => Some(ReplyKind::Bulk),
            4 => Some(ReplyKind::MultiBulkNil),
            5 => Some(ReplyKind::MultiBulk),
            6 => Some(ReplyKind::Integer),
            _ => None,
        }
    }

    /// True for kinds whose value is a byte range.
    pub fn has_data(self) -> bool {
        matches!(
            self,
            ReplyKind::Ok | ReplyKind::Error | ReplyKind::Bulk | ReplyKind::Integer
        )
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyKind::Error => "error",
            ReplyKind::None => "none",
            ReplyKind::Ok => "ok",
            ReplyKind::BulkNil => "bulk-nil",
            ReplyKind::Bulk => "bulk",
            ReplyKind::MultiBulkNil => "multibulk-nil",
            ReplyKind::MultiBulk => "multibulk",
            ReplyKind::Integer => "integer",
        };
        f.write_str(name)
    }
}

/// Where the bytes of a scalar reply live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// No bytes (nil and multibulk replies)
    None,
    /// The batch's read buffer
    Read,
    /// The batch's abort message
    Abort,
}

/// One parsed protocol value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    kind: ReplyKind,
    source: ReplySource,
    offset: usize,
    len: usize,
    children: Vec<Reply>,
}

impl Reply {
    /// A scalar reply whose value is `len` bytes at `offset` in the read buffer.
    pub(crate) fn scalar(kind: ReplyKind, offset: usize, len: usize) -> Self {
        debug_assert!(kind.has_data());
        Self {
            kind,
            source: ReplySource::Read,
            offset,
            len,
            children: Vec::new(),
        }
    }

    /// A reply without a value (`BulkNil`, `MultiBulkNil`).
    pub(crate) fn nil(kind: ReplyKind) -> Self {
        Self {
            kind,
            source: ReplySource::None,
            offset: 0,
            len: 0,
            children: Vec::new(),
        }
    }

    /// An empty multibulk reply expecting `count` children.
    pub(crate) fn multibulk(count: usize) -> Self {
        Self {
            kind: ReplyKind::MultiBulk,
            source: ReplySource::None,
            offset: 0,
            len: count,
            children: Vec::with_capacity(count.min(MAX_PREALLOCATED_CHILDREN)),
        }
    }

    /// An error reply pointing at the batch's abort message.
    pub(crate) fn aborted(len: usize) -> Self {
        Self {
            kind: ReplyKind::Error,
            source: ReplySource::Abort,
            offset: 0,
            len,
            children: Vec::new(),
        }
    }

    pub(crate) fn add_child(&mut self, child: Reply) {
        debug_assert_eq!(self.kind, ReplyKind::MultiBulk);
        self.children.push(child);
    }

    /// The reply type.
    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    /// Where the value bytes live.
    pub fn source(&self) -> ReplySource {
        self.source
    }

    /// Start of the value in its source.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Value length in bytes, or the child count for a multibulk reply.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the value is empty (or the multibulk has no children).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Children of a multibulk reply, in server order.
    pub fn children(&self) -> &[Reply] {
        &self.children
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReplyKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for kind in [
            ReplyKind::Error,
            ReplyKind::None,
            ReplyKind::Ok,
            ReplyKind::BulkNil,
            ReplyKind::Bulk,
            ReplyKind::MultiBulkNil,
            ReplyKind::MultiBulk,
            ReplyKind::Integer,
        ] {
            assert_eq!(ReplyKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ReplyKind::from_code(7), None);
        assert_eq!(ReplyKind::Error.code(), -1);
        assert_eq!(ReplyKind::Integer.code(), 6);
    }

    #[test]
    fn test_has_data() {
        assert!(ReplyKind::Ok.has_data());
        assert!(ReplyKind::Integer.has_data());
        assert!(!ReplyKind::BulkNil.has_data());
        assert!(!ReplyKind::MultiBulk.has_data());
    }

    #[test]
    fn test_multibulk_children_keep_order() {
        let mut parent = Reply::multibulk(2);
        parent.add_child(Reply::scalar(ReplyKind::Bulk, 8, 1));
        parent.add_child(Reply::nil(ReplyKind::BulkNil));
        assert_eq!(parent.len(), 2);
        assert_eq!(parent.children()[0].kind(), ReplyKind::Bulk);
        assert_eq!(parent.children()[0].offset(), 8);
        assert_eq!(parent.children()[1].kind(), ReplyKind::BulkNil);
    }

    #[test]
    fn test_aborted_reply_points_at_message() {
        let reply = Reply::aborted(12);
        assert!(reply.is_error());
        assert_eq!(reply.source(), ReplySource::Abort);
        assert_eq!(reply.len(), 12);
    }

    #[test]
    fn test_display() {
        assert_eq!(ReplyKind::MultiBulkNil.to_string(), "multibulk-nil");
        assert_eq!(ReplyKind::Ok.to_string(), "ok");
    }
}

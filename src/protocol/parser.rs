//! Resumable RESP Reply Parser
//!
//! The parser is a byte-level state machine over the bytes received so far
//! for one batch. It never copies values: every completed [`Reply`] records
//! the offset and length of its text inside the read buffer.
//!
//! ## How the Parser Works
//!
//! [`ReplyParser::execute`] is called with everything received so far and
//! returns either:
//! - `Ok(Some(reply))` - one complete top-level reply
//! - `Ok(None)` - the input ended mid-reply; receive more and call again
//! - `Err(ParseError)` - malformed input, fatal for the connection
//!
//! The parser remembers its position and state between calls, so input split
//! anywhere (mid-digit, mid-body, between CR and LF) resumes at the exact byte.
//!
//! ## Grammar
//!
//! ```text
//! +<text>\r\n                 Ok
//! -<text>\r\n                 Error
//! :[-]<digits>\r\n            Integer
//! $-1\r\n                     BulkNil
//! $<n>\r\n<n bytes>\r\n       Bulk
//! *-1\r\n                     MultiBulkNil
//! *<n>\r\n<n x (Bulk|BulkNil)> MultiBulk
//! ```
//!
//! A multibulk only holds bulk children, so `+ - : *` are rejected while a
//! multibulk is open.

use crate::protocol::reply::{Reply, ReplyKind};
use thiserror::Error;

/// Errors that can occur during reply parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A byte that the grammar does not allow at this point
    #[error("unexpected byte {byte:#04x} at offset {offset} (state: {state})")]
    UnexpectedByte {
        state: &'static str,
        byte: u8,
        offset: usize,
    },

    /// A length prefix above the accepted maximum
    #[error("length prefix too large: {len} (max: {max})")]
    LengthTooLarge { len: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk value (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of children announced by one multibulk header
pub const MAX_MULTIBULK_LEN: usize = 1024 * 1024;

/// Which header a length prefix belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Length {
    Bulk,
    MultiBulk,
}

impl Length {
    fn max(self) -> usize {
        match self {
            Length::Bulk => MAX_BULK_SIZE,
            Length::MultiBulk => MAX_MULTIBULK_LEN,
        }
    }

    fn nil(self) -> ReplyKind {
        match self {
            Length::Bulk => ReplyKind::BulkNil,
            Length::MultiBulk => ReplyKind::MultiBulkNil,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a lead byte
    Start,
    /// Inside `+`/`-` text, waiting for CR
    Line(ReplyKind),
    /// After the CR closing a line
    LineLf(ReplyKind),
    /// After `:`
    IntegerSign,
    /// After `:-`
    IntegerFirstDigit,
    IntegerDigits,
    /// After `$` or `*`
    LengthStart(Length),
    LengthDigits(Length),
    LengthLf(Length),
    /// After `$-` or `*-`
    LengthNil(Length),
    LengthNilCr(Length),
    LengthNilLf(Length),
    BulkBody,
    BulkCr,
    BulkLf,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Start => "start",
            State::Line(_) => "line",
            State::LineLf(_) => "line-lf",
            State::IntegerSign => "integer-sign",
            State::IntegerFirstDigit => "integer-first-digit",
            State::IntegerDigits => "integer-digits",
            State::LengthStart(_) => "length-start",
            State::LengthDigits(_) => "length-digits",
            State::LengthLf(_) => "length-lf",
            State::LengthNil(_) => "length-nil",
            State::LengthNilCr(_) => "length-nil-cr",
            State::LengthNilLf(_) => "length-nil-lf",
            State::BulkBody => "bulk-body",
            State::BulkCr => "bulk-cr",
            State::BulkLf => "bulk-lf",
        }
    }
}

/// A resumable reply parser.
///
/// One parser belongs to one connection and is reset before every batch.
///
/// # Example
///
/// ```
/// use redis_fanout::protocol::{ReplyKind, ReplyParser};
///
/// let mut parser = ReplyParser::new();
/// let input = b"+OK\r\n$3\r\nbar\r\n";
///
/// let ok = parser.execute(&input[..7]).unwrap().unwrap();
/// assert_eq!(ok.kind(), ReplyKind::Ok);
/// assert!(parser.execute(&input[..7]).unwrap().is_none());
///
/// let bulk = parser.execute(input).unwrap().unwrap();
/// assert_eq!(&input[bulk.offset()..bulk.offset() + bulk.len()], b"bar");
/// ```
#[derive(Debug)]
pub struct ReplyParser {
    /// Offset of the next unconsumed byte
    pos: usize,
    state: State,
    /// Start of the token being parsed
    mark: usize,
    /// Accumulated length prefix, then bytes left in a bulk body
    length: usize,
    /// Open multibulk collecting its children
    parent: Option<Reply>,
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyParser {
    /// Creates a parser positioned at offset 0.
    pub fn new() -> Self {
        Self {
            pos: 0,
            state: State::Start,
            mark: 0,
            length: 0,
            parent: None,
        }
    }

    /// Forgets all state and starts again at offset 0.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Offset of the next byte the parser will look at.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// True when no reply is partially parsed.
    pub fn is_idle(&self) -> bool {
        self.state == State::Start && self.parent.is_none()
    }

    /// Parses from the saved position up to the end of `data`.
    ///
    /// `data` must start at the same offset on every call and may only grow
    /// between calls.
    pub fn execute(&mut self, data: &[u8]) -> ParseResult<Option<Reply>> {
        assert!(
            self.pos <= data.len(),
            "parser position {} beyond input length {}",
            self.pos,
            data.len()
        );

        while self.pos < data.len() {
            match self.state {
                State::BulkBody => {
                    let take = self.length.min(data.len() - self.pos);
                    self.pos += take;
                    self.length -= take;
                    if self.length == 0 {
                        self.state = State::BulkCr;
                    }
                    continue;
                }
                State::Line(kind) => {
                    match data[self.pos..].iter().position(|&b| b == b'\r') {
                        Some(cr) => {
                            self.pos += cr + 1;
                            self.state = State::LineLf(kind);
                        }
                        None => self.pos = data.len(),
                    }
                    continue;
                }
                _ => {}
            }

            let offset = self.pos;
            let byte = data[offset];
            self.pos += 1;

            if let Some(reply) = self.step(byte, offset)? {
                if let Some(reply) = self.complete(reply) {
                    return Ok(Some(reply));
                }
            }
        }

        Ok(None)
    }

    /// Consumes one byte, returning a reply when it finishes one.
    fn step(&mut self, byte: u8, offset: usize) -> ParseResult<Option<Reply>> {
        let unexpected = |state: State| ParseError::UnexpectedByte {
            state: state.name(),
            byte,
            offset,
        };

        match self.state {
            State::Start => {
                let nested = self.parent.is_some();
                self.mark = self.pos;
                self.length = 0;
                self.state = match byte {
                    b'$' => State::LengthStart(Length::Bulk),
                    b'+' if !nested => State::Line(ReplyKind::Ok),
                    b'-' if !nested => State::Line(ReplyKind::Error),
                    b':' if !nested => State::IntegerSign,
                    b'*' if !nested => State::LengthStart(Length::MultiBulk),
                    _ => return Err(unexpected(self.state)),
                };
            }

            State::LineLf(kind) => {
                if byte != b'\n' {
                    return Err(unexpected(self.state));
                }
                let len = offset - 1 - self.mark;
                return Ok(Some(Reply::scalar(kind, self.mark, len)));
            }

            State::IntegerSign => {
                self.state = match byte {
                    b'-' => State::IntegerFirstDigit,
                    b'0'..=b'9' => State::IntegerDigits,
                    _ => return Err(unexpected(self.state)),
                };
            }
            State::IntegerFirstDigit => {
                if !byte.is_ascii_digit() {
                    return Err(unexpected(self.state));
                }
                self.state = State::IntegerDigits;
            }
            State::IntegerDigits => match byte {
                b'0'..=b'9' => {}
                b'\r' => self.state = State::LineLf(ReplyKind::Integer),
                _ => return Err(unexpected(self.state)),
            },

            State::LengthStart(target) => match byte {
                b'-' => self.state = State::LengthNil(target),
                b'0'..=b'9' => {
                    self.accumulate(target, byte)?;
                    self.state = State::LengthDigits(target);
                }
                _ => return Err(unexpected(self.state)),
            },
            State::LengthDigits(target) => match byte {
                b'0'..=b'9' => self.accumulate(target, byte)?,
                b'\r' => self.state = State::LengthLf(target),
                _ => return Err(unexpected(self.state)),
            },
            State::LengthLf(target) => {
                if byte != b'\n' {
                    return Err(unexpected(self.state));
                }
                match target {
                    Length::Bulk => {
                        self.mark = self.pos;
                        self.state = if self.length == 0 {
                            State::BulkCr
                        } else {
                            State::BulkBody
                        };
                    }
                    Length::MultiBulk => {
                        let multibulk = Reply::multibulk(self.length);
                        if self.length == 0 {
                            return Ok(Some(multibulk));
                        }
                        self.parent = Some(multibulk);
                        self.state = State::Start;
                    }
                }
            }

            State::LengthNil(target) => {
                if byte != b'1' {
                    return Err(unexpected(self.state));
                }
                self.state = State::LengthNilCr(target);
            }
            State::LengthNilCr(target) => {
                if byte != b'\r' {
                    return Err(unexpected(self.state));
                }
                self.state = State::LengthNilLf(target);
            }
            State::LengthNilLf(target) => {
                if byte != b'\n' {
                    return Err(unexpected(self.state));
                }
                return Ok(Some(Reply::nil(target.nil())));
            }

            State::BulkCr => {
                if byte != b'\r' {
                    return Err(unexpected(self.state));
                }
                self.state = State::BulkLf;
            }
            State::BulkLf => {
                if byte != b'\n' {
                    return Err(unexpected(self.state));
                }
                let len = offset - 1 - self.mark;
                return Ok(Some(Reply::scalar(ReplyKind::Bulk, self.mark, len)));
            }

            // handled by the fast paths in `execute`
            State::Line(_) | State::BulkBody => unreachable!("fast-path state in step"),
        }

        Ok(None)
    }

    fn accumulate(&mut self, target: Length, digit: u8) -> ParseResult<()> {
        let max = target.max();
        let len = self
            .length
            .checked_mul(10)
            .and_then(|n| n.checked_add(usize::from(digit - b'0')))
            .ok_or(ParseError::LengthTooLarge {
                len: usize::MAX,
                max,
            })?;
        if len > max {
            return Err(ParseError::LengthTooLarge { len, max });
        }
        self.length = len;
        Ok(())
    }

    /// Routes a finished value into the open multibulk, yielding the parent
    /// once its last child arrives.
    fn complete(&mut self, reply: Reply) -> Option<Reply> {
        self.state = State::Start;
        match self.parent.as_mut() {
            Some(parent) => {
                parent.add_child(reply);
                if parent.children().len() == parent.len() {
                    self.parent.take()
                } else {
                    None
                }
            }
            None => Some(reply),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parses `input` fed in one piece.
    fn parse_whole(input: &[u8]) -> ParseResult<Vec<Reply>> {
        let mut parser = ReplyParser::new();
        let mut replies = Vec::new();
        while let Some(reply) = parser.execute(input)? {
            replies.push(reply);
        }
        Ok(replies)
    }

    /// Parses `input` revealing one more byte per call.
    fn parse_bytewise(input: &[u8]) -> ParseResult<Vec<Reply>> {
        let mut parser = ReplyParser::new();
        let mut replies = Vec::new();
        for end in 0..=input.len() {
            while let Some(reply) = parser.execute(&input[..end])? {
                replies.push(reply);
            }
        }
        Ok(replies)
    }

    fn text<'a>(input: &'a [u8], reply: &Reply) -> &'a [u8] {
        &input[reply.offset()..reply.offset() + reply.len()]
    }

    #[test]
    fn test_parse_ok() {
        let input = b"+OK\r\n";
        let replies = parse_whole(input).unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].kind(), ReplyKind::Ok);
        assert_eq!(text(input, &replies[0]), b"OK");
    }

    #[test]
    fn test_parse_ok_incomplete() {
        let mut parser = ReplyParser::new();
        assert!(parser.execute(b"+OK").unwrap().is_none());
        assert!(parser.execute(b"+OK\r").unwrap().is_none());
        assert!(!parser.is_idle());
        assert!(parser.execute(b"+OK\r\n").unwrap().is_some());
        assert!(parser.is_idle());
    }

    #[test]
    fn test_parse_error() {
        let input = b"-ERR unknown command\r\n";
        let replies = parse_whole(input).unwrap();
        assert_eq!(replies[0].kind(), ReplyKind::Error);
        assert_eq!(text(input, &replies[0]), b"ERR unknown command");
    }

    #[test]
    fn test_parse_integer() {
        let input = b":1000\r\n:-42\r\n";
        let replies = parse_whole(input).unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].kind(), ReplyKind::Integer);
        assert_eq!(text(input, &replies[0]), b"1000");
        assert_eq!(text(input, &replies[1]), b"-42");
    }

    #[test]
    fn test_parse_invalid_integer() {
        let err = parse_whole(b":12a\r\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedByte {
                state: "integer-digits",
                byte: b'a',
                offset: 3
            }
        );
        assert!(parse_whole(b":-\r\n").is_err());
        assert!(parse_whole(b":\r\n").is_err());
    }

    #[test]
    fn test_parse_bulk() {
        let input = b"$5\r\nhello\r\n";
        let replies = parse_whole(input).unwrap();
        assert_eq!(replies[0].kind(), ReplyKind::Bulk);
        assert_eq!(replies[0].offset(), 4);
        assert_eq!(text(input, &replies[0]), b"hello");
    }

    #[test]
    fn test_parse_empty_bulk() {
        let input = b"$0\r\n\r\n";
        let replies = parse_whole(input).unwrap();
        assert_eq!(replies[0].kind(), ReplyKind::Bulk);
        assert!(replies[0].is_empty());
    }

    #[test]
    fn test_binary_safe_bulk() {
        let input = b"$5\r\nh\r\n\x00o\r\n";
        let replies = parse_whole(input).unwrap();
        assert_eq!(text(input, &replies[0]), b"h\r\n\x00o");
    }

    #[test]
    fn test_parse_nils() {
        let replies = parse_whole(b"$-1\r\n*-1\r\n").unwrap();
        assert_eq!(replies[0].kind(), ReplyKind::BulkNil);
        assert_eq!(replies[1].kind(), ReplyKind::MultiBulkNil);
    }

    #[test]
    fn test_parse_multibulk() {
        let input = b"*2\r\n$1\r\na\r\n$-1\r\n";
        let replies = parse_whole(input).unwrap();
        assert_eq!(replies.len(), 1);
        let parent = &replies[0];
        assert_eq!(parent.kind(), ReplyKind::MultiBulk);
        assert_eq!(parent.len(), 2);
        assert_eq!(parent.children()[0].kind(), ReplyKind::Bulk);
        assert_eq!(text(input, &parent.children()[0]), b"a");
        assert_eq!(parent.children()[1].kind(), ReplyKind::BulkNil);
    }

    #[test]
    fn test_parse_empty_multibulk() {
        let replies = parse_whole(b"*0\r\n+OK\r\n").unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].kind(), ReplyKind::MultiBulk);
        assert!(replies[0].children().is_empty());
        assert_eq!(replies[1].kind(), ReplyKind::Ok);
    }

    #[test]
    fn test_multibulk_rejects_non_bulk_children() {
        for input in [
            &b"*2\r\n:1\r\n:2\r\n"[..],
            b"*1\r\n+OK\r\n",
            b"*1\r\n*1\r\n$1\r\na\r\n",
        ] {
            let err = parse_whole(input).unwrap_err();
            assert!(
                matches!(err, ParseError::UnexpectedByte { state: "start", offset: 4, .. }),
                "{:?}",
                err
            );
        }
    }

    #[test]
    fn test_unknown_lead_byte() {
        let err = parse_whole(b"@foo\r\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedByte {
                byte: b'@',
                offset: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_length_other_than_nil() {
        assert!(parse_whole(b"$-2\r\n").is_err());
        assert!(parse_whole(b"*-12\r\n").is_err());
    }

    #[test]
    fn test_bulk_missing_crlf() {
        let err = parse_whole(b"$1\r\nab\r\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedByte {
                state: "bulk-cr",
                byte: b'b',
                ..
            }
        ));
    }

    #[test]
    fn test_length_too_large() {
        let err = parse_whole(b"$536870913\r\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::LengthTooLarge {
                len: MAX_BULK_SIZE + 1,
                max: MAX_BULK_SIZE
            }
        );
        let err = parse_whole(b"*99999999999999999999999\r\n").unwrap_err();
        assert!(matches!(err, ParseError::LengthTooLarge { .. }));
    }

    #[test]
    fn test_bytewise_feeding_matches_whole() {
        let input: &[u8] = b"+OK\r\n-ERR no\r\n:-7\r\n$3\r\nbar\r\n$0\r\n\r\n$-1\r\n*-1\r\n\
*0\r\n*3\r\n$1\r\na\r\n$-1\r\n$2\r\nbc\r\n";
        let whole = parse_whole(input).unwrap();
        let bytewise = parse_bytewise(input).unwrap();
        assert_eq!(whole.len(), 9);
        assert_eq!(whole, bytewise);
    }

    #[test]
    fn test_resumes_across_chunks() {
        let input = b"$10\r\n0123456789\r\n";
        let mut parser = ReplyParser::new();
        assert!(parser.execute(&input[..2]).unwrap().is_none());
        assert!(parser.execute(&input[..9]).unwrap().is_none());
        assert_eq!(parser.position(), 9);
        let reply = parser.execute(input).unwrap().unwrap();
        assert_eq!(text(input, &reply), b"0123456789");
    }

    #[test]
    fn test_reset() {
        let mut parser = ReplyParser::new();
        assert!(parser.execute(b"*2\r\n$1\r\na\r\n").unwrap().is_none());
        parser.reset();
        assert_eq!(parser.position(), 0);
        assert!(parser.is_idle());
        let reply = parser.execute(b":1\r\n").unwrap().unwrap();
        assert_eq!(reply.kind(), ReplyKind::Integer);
    }
}

//! Command encoding helpers.
//!
//! Commands are sent in the multibulk request form, which is binary safe:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
//! ```

use crate::batch::queue::Batch;
use crate::protocol::{BufferError, CRLF};

/// Decimal digits needed for `n`.
fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

impl Batch {
    /// Encodes one command and counts it as pending.
    ///
    /// Room for the whole command is reserved up front, so a failed call
    /// leaves the batch unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `args` is empty, or if the batch was executed and not reset.
    pub fn write_command(&mut self, args: &[&[u8]]) -> Result<(), BufferError> {
        assert!(!args.is_empty(), "a command needs at least one argument");
        self.assert_writable();

        let size = 1 + digits(args.len()) + 2
            + args
                .iter()
                .map(|arg| 1 + digits(arg.len()) + 2 + arg.len() + 2)
                .sum::<usize>();
        self.write_buffer_mut().ensure_remaining(size)?;

        self.write(format!("*{}\r\n", args.len()).as_bytes(), 0)?;
        let last = args.len() - 1;
        for (i, arg) in args.iter().enumerate() {
            self.write(format!("${}\r\n", arg.len()).as_bytes(), 0)?;
            self.write(arg, 0)?;
            self.write(CRLF, usize::from(i == last))?;
        }
        Ok(())
    }

    /// Queues `GET key`.
    pub fn write_get(&mut self, key: &[u8]) -> Result<(), BufferError> {
        self.write_command(&[b"GET", key])
    }

    /// Queues `SET key value`.
    pub fn write_set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BufferError> {
        self.write_command(&[b"SET", key, value])
    }

    /// Appends `value` in decimal as a fragment of the current command.
    pub fn write_decimal(&mut self, value: i64) -> Result<(), BufferError> {
        self.write(value.to_string().as_bytes(), 0)
    }
}

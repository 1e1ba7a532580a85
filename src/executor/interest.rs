//! Readiness interests of the pairs in one executor round.
//!
//! Sockets are registered edge-triggered. A connection that hits
//! `WouldBlock` asks for another notification through [`Interests::notify`],
//! which (re)registers the socket and so re-arms it. Each wanted direction
//! counts as one outstanding registration until an event consumes it, and
//! the round ends once nothing is outstanding.

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::fmt;
use std::io;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use tracing::trace;

/// A set of event bits delivered to a connection.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness(u8);

impl Readiness {
    pub const EMPTY: Readiness = Readiness(0);
    pub const READ: Readiness = Readiness(1);
    pub const WRITE: Readiness = Readiness(2);
    pub const TIMEOUT: Readiness = Readiness(4);
    pub const ERROR: Readiness = Readiness(8);

    /// The directions a socket can be registered for.
    const IO: Readiness = Readiness(1 | 2);

    #[inline]
    pub fn contains(self, other: Readiness) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bits in `self` that are not in `other`.
    #[inline]
    pub fn without(self, other: Readiness) -> Readiness {
        Readiness(self.0 & !other.0)
    }

    fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Translates a mio event, folding hang-ups and errors into the
    /// direction they interrupt so the next I/O call reports the cause.
    pub(crate) fn from_event(event: &mio::event::Event) -> Readiness {
        let mut readiness = Readiness::EMPTY;
        if event.is_readable() || event.is_read_closed() || event.is_error() {
            readiness |= Readiness::READ;
        }
        if event.is_writable() || event.is_write_closed() || event.is_error() {
            readiness |= Readiness::WRITE;
        }
        readiness
    }

    fn interest(self) -> Option<Interest> {
        match (self.contains(Self::READ), self.contains(Self::WRITE)) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

impl BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

impl BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Readiness) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Readiness {
    type Output = Readiness;

    fn bitand(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 & rhs.0)
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Readiness::READ, "READ"),
            (Readiness::WRITE, "WRITE"),
            (Readiness::TIMEOUT, "TIMEOUT"),
            (Readiness::ERROR, "ERROR"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("EMPTY")
        } else {
            f.write_str(&set.join("|"))
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    wanted: Readiness,
    registered: bool,
}

/// Per-pair registrations against one poller.
#[derive(Debug)]
pub(crate) struct Interests {
    registry: Registry,
    slots: Vec<Slot>,
    outstanding: usize,
}

impl Interests {
    pub(crate) fn new(registry: Registry) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            outstanding: 0,
        }
    }

    /// Adds the slot for the next ordinal.
    pub(crate) fn add_slot(&mut self) {
        self.slots.push(Slot::default());
    }

    /// Wanted directions not yet delivered, over all pairs.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding
    }

    #[cfg(test)]
    pub(crate) fn wanted(&self, ordinal: usize) -> Readiness {
        self.slots[ordinal].wanted
    }

    /// Asks for `event` on the pair's socket.
    ///
    /// The socket is registered on first use and re-registered afterwards,
    /// which re-arms edge-triggered notification.
    pub(crate) fn notify(
        &mut self,
        ordinal: usize,
        stream: &mut TcpStream,
        event: Readiness,
    ) -> io::Result<()> {
        let slot = &mut self.slots[ordinal];
        let added = (event & Readiness::IO).without(slot.wanted);
        self.outstanding += added.count();
        slot.wanted |= added;

        let Some(interest) = slot.wanted.interest() else {
            return Ok(());
        };
        trace!(ordinal, wanted = ?slot.wanted, "arming socket");
        if slot.registered {
            self.registry.reregister(stream, Token(ordinal), interest)
        } else {
            self.registry.register(stream, Token(ordinal), interest)?;
            slot.registered = true;
            Ok(())
        }
    }

    /// Clears the bits that `ready` delivers, returning them.
    pub(crate) fn consume(&mut self, ordinal: usize, ready: Readiness) -> Readiness {
        let Some(slot) = self.slots.get_mut(ordinal) else {
            return Readiness::EMPTY;
        };
        let hit = ready & slot.wanted;
        slot.wanted = slot.wanted.without(hit);
        self.outstanding -= hit.count();
        hit
    }

    /// Clears every wanted bit of the pair.
    pub(crate) fn take_all(&mut self, ordinal: usize) -> Readiness {
        self.consume(ordinal, Readiness::IO)
    }

    /// Drops the pair's registration before its socket goes away.
    pub(crate) fn forget(&mut self, ordinal: usize, stream: &mut TcpStream) {
        self.take_all(ordinal);
        let slot = &mut self.slots[ordinal];
        if slot.registered {
            slot.registered = false;
            if let Err(e) = self.registry.deregister(stream) {
                trace!(ordinal, error = %e, "deregister failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::Poll;
    use std::net::TcpListener;

    fn interests() -> (Poll, Interests) {
        let poll = Poll::new().unwrap();
        let registry = poll.registry().try_clone().unwrap();
        (poll, Interests::new(registry))
    }

    fn stream() -> (TcpListener, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        (listener, stream)
    }

    #[test]
    fn test_readiness_bits() {
        let both = Readiness::READ | Readiness::WRITE;
        assert!(both.contains(Readiness::READ));
        assert!(!both.contains(Readiness::TIMEOUT));
        assert!(!both.contains(Readiness::EMPTY));
        assert_eq!(both.without(Readiness::READ), Readiness::WRITE);
        assert_eq!(both.count(), 2);
        assert_eq!(format!("{:?}", both), "READ|WRITE");
        assert_eq!(format!("{:?}", Readiness::EMPTY), "EMPTY");
    }

    #[test]
    fn test_only_new_bits_are_counted() {
        let (_poll, mut interests) = interests();
        let (_listener, mut stream) = stream();
        interests.add_slot();

        interests.notify(0, &mut stream, Readiness::WRITE).unwrap();
        interests.notify(0, &mut stream, Readiness::WRITE).unwrap();
        assert_eq!(interests.outstanding(), 1);

        interests
            .notify(0, &mut stream, Readiness::READ | Readiness::TIMEOUT)
            .unwrap();
        assert_eq!(interests.outstanding(), 2);
        assert_eq!(interests.wanted(0), Readiness::READ | Readiness::WRITE);
    }

    #[test]
    fn test_consume_clears_delivered_bits() {
        let (_poll, mut interests) = interests();
        let (_listener, mut stream) = stream();
        interests.add_slot();
        interests
            .notify(0, &mut stream, Readiness::READ | Readiness::WRITE)
            .unwrap();

        assert_eq!(interests.consume(0, Readiness::WRITE), Readiness::WRITE);
        assert_eq!(interests.consume(0, Readiness::WRITE), Readiness::EMPTY);
        assert_eq!(interests.outstanding(), 1);
        // events for unknown tokens are ignored
        assert_eq!(interests.consume(7, Readiness::READ), Readiness::EMPTY);
    }

    #[test]
    fn test_forget_drops_everything() {
        let (_poll, mut interests) = interests();
        let (_listener, mut stream) = stream();
        interests.add_slot();
        interests.add_slot();
        interests.notify(1, &mut stream, Readiness::READ).unwrap();

        interests.forget(1, &mut stream);
        assert_eq!(interests.outstanding(), 0);
        assert!(interests.wanted(1).is_empty());

        // a fresh registration works after forgetting
        interests.notify(1, &mut stream, Readiness::WRITE).unwrap();
        assert_eq!(interests.outstanding(), 1);
    }
}

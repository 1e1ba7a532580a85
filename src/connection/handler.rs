//! Connection State Machine
//!
//! A [`Connection`] owns one non-blocking socket to one server and moves a
//! batch through it: connect, send the write buffer, then parse replies out
//! of the read buffer until every pending command is answered.
//!
//! ## States
//!
//! ```text
//!              connect() in progress            writable, no SO_ERROR
//!   ┌────────┐ ───────────────────> ┌────────────┐ ─────────────────> ┌───────────┐
//!   │ Closed │                      │ Connecting │                    │ Connected │
//!   └────────┘ <─────┐              └────────────┘                    └───────────┘
//!                    │ next round         │ I/O error, EOF, timeout        │
//!               ┌─────────┐ <─────────────┴────────────────────────────────┘
//!               │ Aborted │
//!               └─────────┘
//! ```
//!
//! Any failure aborts the batch being served: each of its pending commands
//! gets an error reply carrying `Connection error <detail> [addr: <addr>]`.
//! The connection object itself survives and reconnects on its next round.
//!
//! ## I/O discipline
//!
//! Nothing here ever blocks. A send or receive that would block asks the
//! executor for another readiness notification and returns; the executor
//! calls back into [`Connection::handle_event`] when the socket is ready.

use crate::batch::Batch;
use crate::connection::address::Endpoint;
use crate::engine::{truncate_message, Engine};
use crate::executor::interest::{Interests, Readiness};
use crate::protocol::{Buffer, ReplyParser};
use mio::net::TcpStream;
use std::fmt;
use std::io::{self, Write};
use tracing::{debug, trace};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket
    Closed,
    /// Non-blocking connect in progress
    Connecting,
    /// Socket established
    Connected,
    /// Failed during the current round; becomes `Closed` on the next one
    Aborted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Errors returned synchronously by connection setup.
///
/// Transport failures never show up here: they abort the batch instead.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The address could not be parsed
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
}

/// One server endpoint and its socket.
#[derive(Debug)]
pub struct Connection {
    endpoint: Endpoint,
    stream: Option<TcpStream>,
    state: ConnectionState,
    parser: ReplyParser,
    max_error_len: usize,
}

impl Connection {
    /// Creates a closed connection to `addr` (`host[:port]`).
    ///
    /// No I/O happens until the connection serves its first batch.
    pub fn new(engine: &Engine, addr: &str) -> Result<Self, ConnectionError> {
        let config = engine.config();
        let endpoint = Endpoint::parse(addr, config.default_port)?;
        Ok(Self {
            endpoint,
            stream: None,
            state: ConnectionState::Closed,
            parser: ReplyParser::new(),
            max_error_len: config.max_error_len,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Closes the socket, if any. The next round reconnects.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(server = %self.endpoint, "connection closed");
        }
        self.state = ConnectionState::Closed;
    }

    /// Starts serving `batch` as pair `ordinal` of an executor round.
    ///
    /// Resets the parser, switches the write buffer to read mode and makes
    /// the first write attempt.
    pub(crate) fn execute_start(
        &mut self,
        batch: &mut Batch,
        ordinal: usize,
        interests: &mut Interests,
    ) {
        if self.state == ConnectionState::Aborted {
            self.state = ConnectionState::Closed;
        }
        self.parser.reset();
        batch.start_sending();
        trace!(
            server = %self.endpoint,
            ordinal,
            bytes = batch.write_buffer().remaining(),
            "starting batch"
        );

        self.write_data(batch, ordinal, interests);

        if self.state == ConnectionState::Connected {
            self.notify(batch, ordinal, interests, Readiness::READ);
        }
    }

    /// Reacts to readiness delivered by the executor.
    pub(crate) fn handle_event(
        &mut self,
        event: Readiness,
        batch: &mut Batch,
        ordinal: usize,
        interests: &mut Interests,
    ) {
        if self.state == ConnectionState::Aborted {
            return;
        }
        trace!(server = %self.endpoint, state = %self.state, ?event, "event");

        if event.contains(Readiness::ERROR) {
            self.abort(batch, ordinal, interests, "event error");
            return;
        }
        if event.contains(Readiness::TIMEOUT) {
            let detail = if self.state == ConnectionState::Connecting {
                "connect timeout"
            } else {
                "read/write timeout"
            };
            self.abort(batch, ordinal, interests, detail);
            return;
        }
        if event.contains(Readiness::WRITE) {
            self.write_data(batch, ordinal, interests);
        }
        if event.contains(Readiness::READ) {
            self.read_data(batch, ordinal, interests);
        }
    }

    /// Releases this round's registration before the executor goes away.
    pub(crate) fn finish_round(&mut self, ordinal: usize, interests: &mut Interests) {
        if let Some(stream) = self.stream.as_mut() {
            interests.forget(ordinal, stream);
        }
    }

    fn write_data(&mut self, batch: &mut Batch, ordinal: usize, interests: &mut Interests) {
        if self.state == ConnectionState::Closed && !self.connect(batch, ordinal, interests) {
            return;
        }
        if self.state == ConnectionState::Connecting && !self.finish_connect(batch, ordinal, interests)
        {
            return;
        }
        if self.state != ConnectionState::Connected {
            return;
        }

        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        match send_pending(batch.write_buffer_mut(), stream) {
            Ok(true) => {
                trace!(server = %self.endpoint, "batch sent");
            }
            Ok(false) => self.notify(batch, ordinal, interests, Readiness::WRITE),
            Err(e) => self.abort(batch, ordinal, interests, format!("write error {}", e)),
        }
    }

    /// Resolves the endpoint and starts a non-blocking connect.
    ///
    /// Returns false when the connection is not yet usable for writing.
    fn connect(&mut self, batch: &mut Batch, ordinal: usize, interests: &mut Interests) -> bool {
        let addr = match self.endpoint.resolve() {
            Ok(addr) => addr,
            Err(e) => {
                trace!(server = %self.endpoint, error = %e, "resolve failed");
                self.abort(batch, ordinal, interests, "could not resolve address");
                return false;
            }
        };
        match TcpStream::connect(addr) {
            Ok(stream) => {
                debug!(server = %self.endpoint, %addr, "connecting");
                self.stream = Some(stream);
                self.state = ConnectionState::Connecting;
                self.notify(batch, ordinal, interests, Readiness::WRITE);
                false
            }
            Err(e) => {
                self.abort(batch, ordinal, interests, format!("connect error {}", e));
                false
            }
        }
    }

    /// Checks whether an in-progress connect has completed.
    fn finish_connect(
        &mut self,
        batch: &mut Batch,
        ordinal: usize,
        interests: &mut Interests,
    ) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        match stream.take_error() {
            Ok(None) => {}
            Ok(Some(e)) | Err(e) => {
                self.abort(batch, ordinal, interests, format!("connect error {}", e));
                return false;
            }
        }
        match stream.peer_addr() {
            Ok(_) => {}
            // not connected yet: wait for the next writable edge
            Err(e)
                if e.kind() == io::ErrorKind::NotConnected
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                self.notify(batch, ordinal, interests, Readiness::WRITE);
                return false;
            }
            Err(e) => {
                self.abort(batch, ordinal, interests, format!("connect error {}", e));
                return false;
            }
        }
        if let Err(e) = stream.set_nodelay(true) {
            trace!(server = %self.endpoint, error = %e, "set_nodelay failed");
        }

        debug!(server = %self.endpoint, "connected");
        self.state = ConnectionState::Connected;
        self.notify(batch, ordinal, interests, Readiness::READ);
        self.state == ConnectionState::Connected
    }

    fn read_data(&mut self, batch: &mut Batch, ordinal: usize, interests: &mut Interests) {
        if self.state != ConnectionState::Connected {
            return;
        }

        while batch.has_pending_commands() {
            match self.parser.execute(batch.read_buffer().filled()) {
                Ok(Some(reply)) => {
                    trace!(server = %self.endpoint, kind = %reply.kind(), "reply");
                    batch.push_reply(reply);
                }
                Ok(None) => {
                    let Some(stream) = self.stream.as_mut() else {
                        return;
                    };
                    match batch.read_buffer_mut().recv(stream) {
                        Ok(0) => {
                            self.abort(batch, ordinal, interests, "read eof");
                            return;
                        }
                        Ok(read) => {
                            trace!(server = %self.endpoint, bytes = read, "received");
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            self.notify(batch, ordinal, interests, Readiness::READ);
                            return;
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            self.abort(batch, ordinal, interests, format!("read error {}", e));
                            return;
                        }
                    }
                }
                Err(e) => {
                    debug!(server = %self.endpoint, error = %e, "unparsable reply");
                    self.abort(batch, ordinal, interests, "result parse error");
                    return;
                }
            }
        }
    }

    /// Requests another notification, aborting if the poller refuses it.
    fn notify(
        &mut self,
        batch: &mut Batch,
        ordinal: usize,
        interests: &mut Interests,
        event: Readiness,
    ) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if let Err(e) = interests.notify(ordinal, stream, event) {
            self.abort(batch, ordinal, interests, format!("event error {}", e));
        }
    }

    /// Fails the batch and drops the socket.
    fn abort(
        &mut self,
        batch: &mut Batch,
        ordinal: usize,
        interests: &mut Interests,
        detail: impl fmt::Display,
    ) {
        if self.state == ConnectionState::Aborted {
            return;
        }

        let mut message = format!("Connection error {} [addr: {}]", detail, self.endpoint);
        truncate_message(&mut message, self.max_error_len);
        debug!(server = %self.endpoint, ordinal, error = %message, "connection aborted");

        if !batch.is_aborted() {
            batch.abort(message);
        }
        if let Some(mut stream) = self.stream.take() {
            interests.forget(ordinal, &mut stream);
        }
        self.state = ConnectionState::Aborted;
    }
}

/// Sends until `buffer` drains (`Ok(true)`) or `sink` would block (`Ok(false)`).
///
/// A send that accepts zero bytes is a `WriteZero` error.
fn send_pending<W: Write>(buffer: &mut Buffer, sink: &mut W) -> io::Result<bool> {
    while buffer.remaining() > 0 {
        match buffer.send(sink) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(sent) => trace!(bytes = sent, "sent"),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

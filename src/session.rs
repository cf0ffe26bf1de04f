//! Client-side TLS session driver.
//!
//! [`Session`] is the state machine that coordinates handshake
//! progression, the buffered write queue, and plaintext delivery.  It
//! is deliberately transport-generic: production code hands it a
//! `mio::net::TcpStream` via [`TlsClient`](crate::TlsClient), tests
//! hand it an in-memory pipe.  All calls are made from the owning
//! event-loop thread; there is no internal locking.

use crate::connect::{completion, ConnectFuture, Resolver};
use crate::engine::{Decrypted, HandshakeStep, TlsEngine};
use crate::queue::WriteQueue;
use crate::Error;
use std::io::{self, Read, Write};
use tracing::{debug, trace, warn};

/// Capacity of the reusable deciphered-output buffer.
pub const OUTPUT_BUF_SIZE: usize = 64 * 1024;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, not yet connecting.
    Idle,
    /// TCP connect in flight.
    Connecting,
    /// TLS negotiation in progress.
    Handshaking,
    /// Handshake done; plaintext flows both ways.
    Established,
    /// Ended cleanly, by us or by the peer.
    Closed,
    /// Torn down after a fatal error.
    Failed,
}

/// Downstream receiver of deciphered plaintext.
///
/// Chunks arrive in the order the underlying ciphertext arrived.  Each
/// slice borrows the session's reusable output buffer and is
/// overwritten by the next decrypt cycle, so copy it if you keep it.
pub trait Consumer {
    fn recv(&mut self, chunk: &[u8]);

    /// Clean end-of-stream from the peer.
    fn eof(&mut self) {}
}

/// One TLS session: owns the engine, the write queue, the output
/// buffer and the handshake-completion resolver.  Exactly one session
/// exists per connection.
pub struct Session<E: TlsEngine> {
    engine: Option<E>,
    state: State,
    queue: WriteQueue,
    out_buf: Box<[u8]>,
    resolver: Resolver,
}

impl<E: TlsEngine> Session<E> {
    /// Wrap an engine in a new `Idle` session.  The returned
    /// [`ConnectFuture`] resolves once the session reaches
    /// `Established` or fails.
    pub fn new(engine: E) -> (Self, ConnectFuture) {
        let (resolver, future) = completion();
        let session = Self {
            engine: Some(engine),
            state: State::Idle,
            queue: WriteQueue::new(),
            out_buf: vec![0; OUTPUT_BUF_SIZE].into_boxed_slice(),
            resolver,
        };
        (session, future)
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Total plaintext bytes queued but not yet passed to the engine.
    pub fn queued(&self) -> usize {
        self.queue.pending()
    }

    /// Whether the owner should keep the write readiness source armed.
    pub fn wants_write(&self) -> bool {
        match self.state {
            State::Connecting => true,
            State::Handshaking => self.engine.as_ref().is_some_and(|e| e.wants_write()),
            State::Established => {
                !self.queue.is_empty()
                    || self.engine.as_ref().is_some_and(|e| e.wants_write())
            }
            State::Idle | State::Closed | State::Failed => false,
        }
    }

    /// Mark the TCP connect as initiated.  The owner calls
    /// [`start_handshake`](Session::start_handshake) once the socket
    /// reports connected.
    pub fn begin_connect(&mut self) -> Result<(), Error> {
        if self.state != State::Idle {
            return Err(Error::InvalidState("connect on a session already in use"));
        }
        self.state = State::Connecting;
        Ok(())
    }

    /// Transition to `Handshaking` and take the first step.  Valid
    /// from `Idle` (upgrading an already-connected stream) or from
    /// `Connecting` once the socket reports connected.
    pub fn start_handshake<T: Read + Write>(&mut self, io: &mut T) -> Result<(), Error> {
        match self.state {
            State::Idle | State::Connecting => {
                self.state = State::Handshaking;
                self.step(io)
            }
            _ => Err(Error::InvalidState("handshake already started")),
        }
    }

    /// React to a socket-readable event.
    ///
    /// While handshaking, would-block is benign and any other failure
    /// is fatal.  Once established, each decrypt cycle fills the
    /// output buffer from offset zero and hands the filled slice to
    /// `consumer` before the next cycle overwrites it; cycles repeat
    /// until the engine reports would-block, so an edge-triggered
    /// notifier never strands buffered ciphertext.
    pub fn on_readable<T, C>(&mut self, io: &mut T, consumer: &mut C) -> Result<(), Error>
    where
        T: Read + Write,
        C: Consumer,
    {
        match self.state {
            State::Handshaking => {
                self.step(io)?;
                if self.state == State::Established {
                    // The flight that completed the handshake may have
                    // carried application data
                    self.drain(io, consumer).map_err(|e| self.fail(e))?;
                    self.flush_queue(io).map_err(|e| self.fail(e))?;
                }
                Ok(())
            }
            State::Established => self.drain(io, consumer).map_err(|e| self.fail(e)),
            // Stale or spurious wakeup; nothing to do
            _ => Ok(()),
        }
    }

    /// React to a socket-writable event: flush pending ciphertext,
    /// then pop queued plaintext front-to-back, honouring partial
    /// writes.
    pub fn on_writable<T: Read + Write>(&mut self, io: &mut T) -> Result<(), Error> {
        match self.state {
            State::Handshaking => {
                self.step(io)?;
                if self.state == State::Established {
                    self.flush_queue(io).map_err(|e| self.fail(e))?;
                }
                Ok(())
            }
            State::Established => self.flush_queue(io).map_err(|e| self.fail(e)),
            _ => Ok(()),
        }
    }

    /// Queue plaintext for enciphering and transmission.  Never
    /// blocks: actual transmission happens on a later writable event.
    /// Empty input is a no-op and never reaches the wire.  The owner
    /// should resume its write readiness source after a successful
    /// enqueue.
    pub fn enqueue(&mut self, bytes: impl Into<Vec<u8>>) -> Result<(), Error> {
        if matches!(self.state, State::Closed | State::Failed) {
            return Err(Error::InvalidState("enqueue on a closed session"));
        }
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Ok(());
        }
        trace!(len = bytes.len(), "enqueued plaintext");
        self.queue.push(bytes);
        Ok(())
    }

    /// Graceful shutdown: send `close_notify` if established, resolve
    /// a still-pending connect future with an error, release the
    /// engine and buffers.
    pub fn close<T: Read + Write>(&mut self, io: &mut T) {
        if matches!(self.state, State::Closed | State::Failed) {
            return;
        }
        if self.state == State::Established {
            if let Some(engine) = self.engine.as_mut() {
                engine.send_close();
                let _ = engine.flush(io);
            }
        }
        if self.resolver.is_pending() {
            self.resolver.resolve(Err(Error::HandshakeFailed(
                "connection closed before the handshake completed".into(),
            )));
        }
        self.teardown(State::Closed);
        debug!("session closed");
    }

    /// Record a fatal error: fail a pending connect future with the
    /// cause, tear down, and hand an error back for propagation.  The
    /// future keeps the typed cause; the caller-facing copy carries a
    /// rendered summary, since the error itself can only go one way.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        warn!(%err, "TLS session failed");
        self.teardown(State::Failed);
        if self.resolver.is_pending() {
            let summary = Error::HandshakeFailed(err.to_string().into());
            self.resolver.resolve(Err(match err {
                Error::HandshakeFailed(_) => err,
                other => Error::HandshakeFailed(Box::new(other)),
            }));
            summary
        } else {
            err
        }
    }

    fn step<T: Read + Write>(&mut self, io: &mut T) -> Result<(), Error> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(Error::InvalidState("handshake on a torn-down session"));
        };
        match engine.handshake_step(io) {
            Ok(HandshakeStep::Complete) => {
                debug!("TLS handshake completed");
                self.state = State::Established;
                self.resolver.resolve(Ok(()));
                Ok(())
            }
            Ok(HandshakeStep::WouldBlock) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn drain<T, C>(&mut self, io: &mut T, consumer: &mut C) -> Result<(), Error>
    where
        T: Read + Write,
        C: Consumer,
    {
        loop {
            let Some(engine) = self.engine.as_mut() else {
                return Ok(());
            };
            match engine.decrypt(io, &mut self.out_buf)? {
                Decrypted::Data(n) => {
                    trace!(len = n, "deciphered");
                    consumer.recv(&self.out_buf[..n]);
                }
                Decrypted::WouldBlock => return Ok(()),
                Decrypted::Eof => {
                    debug!("peer ended the TLS stream");
                    self.teardown(State::Closed);
                    consumer.eof();
                    return Ok(());
                }
                Decrypted::Abort => {
                    return Err(Error::SocketIo(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "transport closed without close_notify",
                    )));
                }
            }
        }
    }

    fn flush_queue<T: Read + Write>(&mut self, io: &mut T) -> Result<(), Error> {
        loop {
            let Some(engine) = self.engine.as_mut() else {
                return Ok(());
            };
            engine.flush(io)?;
            if engine.wants_write() {
                // Socket saturated; wait for the next writable edge
                return Ok(());
            }
            let Some(chunk) = self.queue.front() else {
                return Ok(());
            };
            let n = engine.encrypt(chunk)?;
            if n == 0 {
                return Ok(());
            }
            trace!(len = n, "enciphered");
            self.queue.advance(n);
        }
    }

    fn teardown(&mut self, state: State) {
        self.state = state;
        self.queue.clear();
        self.engine = None;
        self.out_buf = Vec::new().into_boxed_slice();
    }
}

//! TLS engine capability boundary, and the Rustls backend.
//!
//! The [`Session`](crate::Session) driver only ever talks to a
//! [`TlsEngine`], so the cryptographic backend can be swapped without
//! touching the state machine.  Raw socket I/O is passed into each
//! call as a plain `Read + Write` transport rather than being captured
//! by the engine, which keeps ownership of the socket with the caller.

use crate::Error;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

/// Outcome of one handshake step.
#[derive(Debug)]
pub enum HandshakeStep {
    /// Negotiation finished; plaintext may now flow.
    Complete,
    /// More I/O readiness is needed; re-arm and wait.
    WouldBlock,
}

/// Outcome of one decrypt cycle.
#[derive(Debug)]
pub enum Decrypted {
    /// `n` deciphered bytes were written into the caller's buffer.
    Data(usize),
    /// No more ciphertext available without waiting for readiness.
    WouldBlock,
    /// The peer ended the stream cleanly with a `close_notify`.
    Eof,
    /// The transport ended without a clean TLS closure (truncation).
    Abort,
}

/// Capability interface of a client-side TLS session.
///
/// All methods are non-blocking: a transport that cannot make progress
/// must return `ErrorKind::WouldBlock`, which the engine converts into
/// the would-block arms of its result enums.
pub trait TlsEngine {
    /// Drive the handshake as far as the transport allows.
    fn handshake_step<T: Read + Write>(&mut self, io: &mut T) -> Result<HandshakeStep, Error>;

    /// Pull available ciphertext from the transport and decipher into
    /// `buf`, starting at offset zero.  Plaintext the engine already
    /// holds buffered is drained before the transport is touched, so
    /// calling again in the same event picks up the remainder.
    fn decrypt<T: Read + Write>(&mut self, io: &mut T, buf: &mut [u8])
        -> Result<Decrypted, Error>;

    /// Move plaintext into the engine for enciphering.  Returns how
    /// many bytes were accepted, which may be fewer than offered.
    fn encrypt(&mut self, plain: &[u8]) -> Result<usize, Error>;

    /// Write pending ciphertext to the transport, honouring partial
    /// writes.  Stops at would-block; check [`wants_write`] after.
    ///
    /// [`wants_write`]: TlsEngine::wants_write
    fn flush<T: Read + Write>(&mut self, io: &mut T) -> Result<(), Error>;

    /// Whether the engine holds ciphertext waiting to go out.
    fn wants_write(&self) -> bool;

    /// Queue a clean end-of-stream (`close_notify`) for the peer.
    fn send_close(&mut self);
}

/// [`TlsEngine`] backend over a [**Rustls**] `ClientConnection`.
///
/// The peer name to validate against and any client certificate
/// identity are bound at construction, before the first handshake byte
/// moves.
///
/// [**Rustls**]: https://crates.io/crates/rustls
pub struct RustlsEngine {
    conn: ClientConnection,
}

impl RustlsEngine {
    pub fn new(config: Arc<ClientConfig>, name: ServerName<'static>) -> Result<Self, Error> {
        let conn = ClientConnection::new(config, name).map_err(Error::ContextCreationFailed)?;
        Ok(Self { conn })
    }

    /// Immutable access to the wrapped `ClientConnection`.
    pub fn connection(&self) -> &ClientConnection {
        &self.conn
    }
}

impl TlsEngine for RustlsEngine {
    fn handshake_step<T: Read + Write>(&mut self, io: &mut T) -> Result<HandshakeStep, Error> {
        loop {
            while self.conn.wants_write() {
                match self.conn.write_tls(io) {
                    Ok(0) => return Err(Error::SocketIo(ErrorKind::WriteZero.into())),
                    Ok(_) => (),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        return Ok(HandshakeStep::WouldBlock)
                    }
                    Err(e) => return Err(Error::SocketIo(e)),
                }
            }

            if !self.conn.is_handshaking() {
                return Ok(HandshakeStep::Complete);
            }

            match self.conn.read_tls(io) {
                Ok(0) => {
                    return Err(Error::HandshakeFailed(
                        "peer closed the connection during the handshake".into(),
                    ))
                }
                Ok(_) => (),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(HandshakeStep::WouldBlock)
                }
                Err(e) => return Err(Error::SocketIo(e)),
            }

            if let Err(e) = self.conn.process_new_packets() {
                // Get the alert out before reporting, best effort
                let _ = self.conn.write_tls(io);
                return Err(Error::HandshakeFailed(Box::new(e)));
            }
        }
    }

    fn decrypt<T: Read + Write>(
        &mut self,
        io: &mut T,
        buf: &mut [u8],
    ) -> Result<Decrypted, Error> {
        loop {
            // Drain plaintext Rustls already holds before touching the
            // transport
            match self.conn.reader().read(buf) {
                Ok(0) => return Ok(Decrypted::Eof),
                Ok(n) => return Ok(Decrypted::Data(n)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => (),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(Decrypted::Abort),
                Err(e) => return Err(Error::SocketIo(e)),
            }

            match self.conn.read_tls(io) {
                Ok(0) => return Ok(Decrypted::Abort),
                Ok(_) => (),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Decrypted::WouldBlock),
                Err(e) => return Err(Error::SocketIo(e)),
            }

            self.conn.process_new_packets().map_err(|e| {
                Error::SocketIo(std::io::Error::new(ErrorKind::InvalidData, e))
            })?;
        }
    }

    fn encrypt(&mut self, plain: &[u8]) -> Result<usize, Error> {
        match self.conn.writer().write(plain) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(Error::SocketIo(e)),
        }
    }

    fn flush<T: Read + Write>(&mut self, io: &mut T) -> Result<(), Error> {
        while self.conn.wants_write() {
            match self.conn.write_tls(io) {
                Ok(0) => return Err(Error::SocketIo(ErrorKind::WriteZero.into())),
                Ok(_) => (),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::SocketIo(e)),
            }
        }
        Ok(())
    }

    fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }

    fn send_close(&mut self) {
        self.conn.send_close_notify();
    }
}

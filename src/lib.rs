//! Non-blocking TLS client sessions for [`mio`] event loops, backed by
//! [**Rustls**]
//!
//! This crate upgrades an already-connected (or freshly connected)
//! stream socket into an encrypted duplex byte stream.  The TLS
//! handshake is driven asynchronously from socket readiness events:
//! nothing here ever blocks the event-loop thread, and "would block"
//! results re-arm the relevant readiness interest rather than spin.
//!
//! The pieces, from the bottom up:
//!
//! - [`TlsEngine`] is the capability boundary around the cryptographic
//!   session: `handshake_step`, `decrypt`, `encrypt`, `flush`.  The
//!   [`RustlsEngine`] backend implements it over a [**Rustls**]
//!   `ClientConnection`; the session driver never names Rustls types,
//!   so another backend can be dropped in.
//! - [`Session`] is the state machine.  It owns the engine, a FIFO
//!   write queue of pending outbound plaintext (each entry keeps a
//!   cursor so short writes never lose bytes), and a single reusable
//!   64 KiB deciphered-output buffer.  It reacts to `on_readable` /
//!   `on_writable` calls against any `Read + Write` transport, which
//!   also makes it directly testable against in-memory pipes.
//! - [`TlsClient`] binds a `Session` to a `mio::net::TcpStream`:
//!   non-blocking connect, handshake orchestration, and suspending or
//!   resuming the write readiness interest as the queue drains and
//!   refills.
//!
//! Handshake completion is observed through a [`ConnectFuture`], a
//! one-shot completion that resolves exactly once: `Ok(())` when the
//! session is established, or an error on the first fatal failure.
//! Closing a session with the future still pending resolves it with an
//! error, so no caller waits forever.  No timeout is enforced here;
//! race the future against your own timer if you need one.
//!
//! Deciphered plaintext is pushed to a [`Consumer`] one slice per
//! decrypt cycle.  The slice borrows the session's reusable buffer and
//! is overwritten by the next cycle, so copy it if you keep it.
//!
//! # Versioning
//!
//! Rustls is re-exported as `mio_rustls::rustls`.  This crate brings in
//! [**Rustls**] with only `std` enabled, so include the same version of
//! Rustls in your own dependencies to select the features you need,
//! especially the crypto provider:
//!
//! ```ignore
//! [dependencies]
//! mio_rustls = "0.1"
//! rustls = { version = "0.23", features = ["ring"] }
//! ```
//!
//! [`mio`]: https://crates.io/crates/mio
//! [**Rustls**]: https://crates.io/crates/rustls

#![forbid(unsafe_code)]

pub use rustls;

mod client;
mod connect;
mod engine;
mod queue;
mod session;

pub use client::{ClientSettings, TlsClient};
pub use connect::ConnectFuture;
pub use engine::{Decrypted, HandshakeStep, RustlsEngine, TlsEngine};
pub use session::{Consumer, Session, State, OUTPUT_BUF_SIZE};

/// Error in TLS client processing
///
/// "Would block" is never an error: it surfaces as the `WouldBlock`
/// arms of [`HandshakeStep`] and [`Decrypted`] and means "wait for the
/// next readiness event".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The TLS engine could not be instantiated
    #[error("cannot create TLS context: {0}")]
    ContextCreationFailed(#[source] rustls::Error),

    /// Negotiation, certificate or protocol error during the handshake
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Unexpected socket I/O failure, distinct from would-block
    #[error("socket I/O error: {0}")]
    SocketIo(#[from] std::io::Error),

    /// Operation attempted outside its valid session state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

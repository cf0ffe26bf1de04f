//! Mio-facing client: connect orchestration and readiness interest.
//!
//! [`TlsClient`] binds a [`Session`] to a `mio::net::TcpStream`
//! registered with the caller's `mio::Registry`.  The caller runs the
//! poll loop and forwards each event for the client's token to
//! [`handle_event`](TlsClient::handle_event); the client recomputes
//! and re-registers its readiness interest afterwards, which is how
//! the write source is suspended when there is nothing to send and
//! resumed on [`enqueue`](TlsClient::enqueue).

use crate::engine::RustlsEngine;
use crate::session::{Consumer, Session, State};
use crate::{ConnectFuture, Error};
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::io::{self, ErrorKind};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration surface of a client session: trust anchors, the peer
/// name to validate, and an optional client certificate identity.
pub struct ClientSettings {
    roots: RootCertStore,
    peer_name: Option<String>,
    client_identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
}

impl ClientSettings {
    pub fn new(roots: RootCertStore) -> Self {
        Self {
            roots,
            peer_name: None,
            client_identity: None,
        }
    }

    /// Name the server certificate is validated against.  When unset,
    /// the hostname passed to [`TlsClient::connect`] is used.
    pub fn peer_name(mut self, name: impl Into<String>) -> Self {
        self.peer_name = Some(name.into());
        self
    }

    /// Certificate chain and private key presented to servers that
    /// request client authentication.
    pub fn client_identity(
        mut self,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Self {
        self.client_identity = Some((chain, key));
        self
    }

    /// Build the engine, binding peer name and identity before the
    /// handshake can begin.
    fn into_engine(self, fallback_name: &str) -> Result<RustlsEngine, Error> {
        let name = self.peer_name.unwrap_or_else(|| fallback_name.to_owned());
        let name = ServerName::try_from(name).map_err(|e| {
            Error::ContextCreationFailed(rustls::Error::General(format!(
                "invalid peer name: {e}"
            )))
        })?;

        let builder = ClientConfig::builder().with_root_certificates(self.roots);
        let config = match self.client_identity {
            Some((chain, key)) => builder
                .with_client_auth_cert(chain, key)
                .map_err(Error::ContextCreationFailed)?,
            None => builder.with_no_client_auth(),
        };

        RustlsEngine::new(Arc::new(config), name)
    }
}

/// A [`Session`] bound to a mio TCP stream.
///
/// Dropping the client deregisters nothing on its own; call
/// [`close`](TlsClient::close) to shut down cleanly.  The stream
/// itself is owned here and released on drop, so the descriptor never
/// outlives the client.
pub struct TlsClient {
    stream: TcpStream,
    token: Token,
    session: Session<RustlsEngine>,
    interest: Interest,
}

impl TlsClient {
    /// Resolve `hostname:port`, start a non-blocking TCP connect and
    /// register with `registry` under `token`.  The returned future
    /// resolves once the TLS handshake completes or fails; never
    /// assume synchronous completion.
    pub fn connect(
        registry: &Registry,
        token: Token,
        hostname: &str,
        port: u16,
        settings: ClientSettings,
    ) -> Result<(Self, ConnectFuture), Error> {
        let addr = (hostname, port).to_socket_addrs()?.next().ok_or_else(|| {
            Error::SocketIo(io::Error::new(
                ErrorKind::NotFound,
                "hostname resolved to no addresses",
            ))
        })?;

        let engine = settings.into_engine(hostname)?;
        let (mut session, future) = Session::new(engine);
        session.begin_connect()?;

        let mut stream = TcpStream::connect(addr)?;
        let interest = Interest::READABLE | Interest::WRITABLE;
        registry.register(&mut stream, token, interest)?;
        info!(%addr, hostname, "initiating TLS connection");

        Ok((
            Self {
                stream,
                token,
                session,
                interest,
            },
            future,
        ))
    }

    /// Upgrade an already-connected stream.  `settings` must carry a
    /// peer name, since there is no connect hostname to fall back to.
    pub fn upgrade(
        registry: &Registry,
        token: Token,
        mut stream: TcpStream,
        settings: ClientSettings,
    ) -> Result<(Self, ConnectFuture), Error> {
        if settings.peer_name.is_none() {
            return Err(Error::InvalidState("upgrade requires a peer name"));
        }
        let engine = settings.into_engine("")?;
        let (mut session, future) = Session::new(engine);
        session.start_handshake(&mut stream)?;

        let interest = Interest::READABLE | Interest::WRITABLE;
        registry.register(&mut stream, token, interest)?;
        debug!("upgrading connected stream to TLS");

        Ok((
            Self {
                stream,
                token,
                session,
                interest,
            },
            future,
        ))
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    /// Process one readiness event for this client's token.
    ///
    /// Fatal errors tear the session down, deregister the stream and
    /// are returned to the caller; a handshake-phase failure has
    /// already been delivered through the [`ConnectFuture`] as well.
    pub fn handle_event<C: Consumer>(
        &mut self,
        registry: &Registry,
        event: &Event,
        consumer: &mut C,
    ) -> Result<(), Error> {
        debug_assert_eq!(event.token(), self.token);

        let result = self.dispatch(event, consumer);
        match result {
            Ok(()) => {
                if matches!(self.session.state(), State::Closed | State::Failed) {
                    let _ = registry.deregister(&mut self.stream);
                    Ok(())
                } else {
                    self.update_interest(registry)
                }
            }
            Err(e) => {
                let _ = registry.deregister(&mut self.stream);
                Err(e)
            }
        }
    }

    /// Queue plaintext for transmission and resume the write readiness
    /// source if it was suspended.  Does not block; the data goes out
    /// on a later writable event.
    pub fn enqueue(
        &mut self,
        registry: &Registry,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<(), Error> {
        self.session.enqueue(bytes)?;
        self.update_interest(registry)
    }

    /// Graceful shutdown: close the session and release the readiness
    /// sources.  A still-pending [`ConnectFuture`] resolves with an
    /// error.
    pub fn close(&mut self, registry: &Registry) {
        self.session.close(&mut self.stream);
        let _ = registry.deregister(&mut self.stream);
    }

    fn dispatch<C: Consumer>(&mut self, event: &Event, consumer: &mut C) -> Result<(), Error> {
        if event.is_writable() {
            if self.session.state() == State::Connecting {
                // Writability signals TCP connect completion; an error
                // on the socket means the connect failed
                if let Some(err) = self.stream.take_error().unwrap_or_else(Some) {
                    warn!(%err, "TCP connect failed");
                    return Err(self.session.fail(Error::SocketIo(err)));
                }
                match self.stream.peer_addr() {
                    Ok(_) => {
                        debug!("TCP connect completed");
                        self.session.start_handshake(&mut self.stream)?;
                    }
                    // Spurious wakeup, the connect is still in flight
                    Err(e)
                        if e.kind() == ErrorKind::NotConnected
                            || e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => return Err(self.session.fail(Error::SocketIo(e))),
                }
            } else {
                self.session.on_writable(&mut self.stream)?;
            }
        }

        if event.is_readable() {
            self.session.on_readable(&mut self.stream, consumer)?;
        }

        Ok(())
    }

    /// Re-register with the interest the session currently needs.
    /// Dropping WRITABLE suspends the write source without cancelling
    /// it; a later re-registration resumes it.
    fn update_interest(&mut self, registry: &Registry) -> Result<(), Error> {
        let wanted = if self.session.wants_write() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        if wanted != self.interest {
            registry.reregister(&mut self.stream, self.token, wanted)?;
            self.interest = wanted;
        }
        Ok(())
    }
}

//! One-shot handshake completion: resolve-once, observe-once.

use crate::Error;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};

/// Create a linked resolver/future pair.
pub(crate) fn completion() -> (Resolver, ConnectFuture) {
    let (tx, rx) = sync_channel(1);
    (Resolver { tx: Some(tx) }, ConnectFuture { rx, observed: false })
}

/// Session-side half: resolves the future at most once.  Resolutions
/// after the first are silently dropped.
pub(crate) struct Resolver {
    tx: Option<SyncSender<Result<(), Error>>>,
}

impl Resolver {
    pub fn resolve(&mut self, result: Result<(), Error>) {
        if let Some(tx) = self.tx.take() {
            // The observer may already be gone; that's fine.
            let _ = tx.send(result);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.tx.is_some()
    }
}

/// Completion of the connect/handshake phase.
///
/// Resolves exactly once: `Ok(())` when the session reaches
/// `Established`, or an error on the first fatal failure.  If the
/// session is dropped or closed with the handshake still pending the
/// future resolves with an error rather than staying pending forever.
pub struct ConnectFuture {
    rx: Receiver<Result<(), Error>>,
    observed: bool,
}

impl ConnectFuture {
    /// Non-blocking check, for polling between event-loop turns.
    /// Returns `None` until resolved, then the result once; later
    /// calls return `None` again.
    pub fn try_resolved(&mut self) -> Option<Result<(), Error>> {
        if self.observed {
            return None;
        }
        match self.rx.try_recv() {
            Ok(result) => {
                self.observed = true;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.observed = true;
                Some(Err(Error::HandshakeFailed(
                    "session dropped before the handshake completed".into(),
                )))
            }
        }
    }

    /// Block until resolved.  Only sensible when the event loop runs
    /// on another thread; calling this from the loop thread deadlocks.
    pub fn wait(self) -> Result<(), Error> {
        if self.observed {
            return Err(Error::InvalidState("connect future already observed"));
        }
        self.rx.recv().unwrap_or_else(|_| {
            Err(Error::HandshakeFailed(
                "session dropped before the handshake completed".into(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::completion;
    use crate::Error;

    #[test]
    fn resolves_once() {
        let (mut resolver, mut future) = completion();
        assert!(resolver.is_pending());
        assert!(future.try_resolved().is_none());

        resolver.resolve(Ok(()));
        assert!(!resolver.is_pending());
        // A second resolution is dropped, first one wins
        resolver.resolve(Err(Error::InvalidState("late")));

        assert!(matches!(future.try_resolved(), Some(Ok(()))));
        // Observe-once: nothing more to see
        assert!(future.try_resolved().is_none());
    }

    #[test]
    fn dropped_resolver_fails_future() {
        let (resolver, mut future) = completion();
        drop(resolver);
        match future.try_resolved() {
            Some(Err(Error::HandshakeFailed(_))) => (),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(future.try_resolved().is_none());
    }

    #[test]
    fn wait_returns_resolution() {
        let (mut resolver, future) = completion();
        resolver.resolve(Ok(()));
        assert!(future.wait().is_ok());
    }
}

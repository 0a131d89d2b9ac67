//! Transport abstraction for the event stream.
//!
//! A [`Connector`] opens one physical connection and hands back a
//! [`TransportLink`]: an outbound frame channel plus an inbound stream of
//! [`TransportEvent`]s. The supervisor owns the link; dropping the outbound
//! sender closes the connection once the queued frames are written.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::error::ClientResult;

/// Lifecycle and data events emitted by one physical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed; frames can flow.
    Opened,
    /// One inbound frame.
    FrameReceived(Vec<u8>),
    /// The connection closed. Terminal.
    Closed {
        /// Close code (1006 when no close frame was received).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// Socket-level failure. Terminal.
    TransportError {
        /// Human-readable detail.
        detail: String,
    },
}

/// Both halves of an opened connection.
#[derive(Debug)]
pub struct TransportLink {
    /// Outbound text frames. Dropping every sender closes the connection.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Inbound lifecycle and data events, starting with [`TransportEvent::Opened`].
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Completes once the writer has written every queued frame and closed
    /// the connection. A dropped sender means the writer is gone.
    pub flushed: oneshot::Receiver<()>,
}

/// Opens physical connections to the event stream.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthorized`](crate::ClientError::Unauthorized)
    /// if the server rejected the token during the handshake, or any other
    /// error if the connection could not be established.
    async fn open(&self, url: &str) -> ClientResult<TransportLink>;
}

/// Handle to the currently open connection, if any.
///
/// Sends are fire-and-forget: with no open connection the frame is dropped.
#[derive(Debug, Default)]
pub struct TransportConnection {
    outbound: Option<mpsc::UnboundedSender<String>>,
    flushed: Option<oneshot::Receiver<()>>,
}

impl TransportConnection {
    /// A handle with no open connection.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Route sends to `outbound` from now on. `flushed` is the link's
    /// writer-finished signal.
    pub fn attach(
        &mut self,
        outbound: mpsc::UnboundedSender<String>,
        flushed: oneshot::Receiver<()>,
    ) {
        self.outbound = Some(outbound);
        self.flushed = Some(flushed);
    }

    /// Whether a connection is attached and its writer is still running.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Hand one frame to the writer. Dropped silently when not open.
    pub fn send(&self, frame: String) {
        match &self.outbound {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    trace!("writer gone, dropping outbound frame");
                }
            },
            None => trace!("not connected, dropping outbound frame"),
        }
    }

    /// Detach and close the connection. Returns whether one was attached.
    ///
    /// Idempotent.
    pub fn close(&mut self) -> bool {
        self.close_for_flush().is_some()
    }

    /// Detach and close the connection, returning the writer-finished
    /// signal if one was attached.
    pub fn close_for_flush(&mut self) -> Option<oneshot::Receiver<()>> {
        let flushed = self.flushed.take();
        self.outbound.take().and(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_send_is_a_no_op() {
        let conn = TransportConnection::detached();
        assert!(!conn.is_open());
        conn.send("{}".into());
    }

    #[test]
    fn attached_send_reaches_writer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_flushed_tx, flushed) = oneshot::channel();
        let mut conn = TransportConnection::detached();
        conn.attach(tx, flushed);
        assert!(conn.is_open());

        conn.send("frame".into());
        assert_eq!(rx.try_recv().unwrap(), "frame");
    }

    #[test]
    fn close_is_idempotent_and_ends_writer() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let (_flushed_tx, flushed) = oneshot::channel();
        let mut conn = TransportConnection::detached();
        conn.attach(tx, flushed);

        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.is_open());
        // Sender dropped: the writer sees end of stream.
        assert!(rx.try_recv().is_err());
        assert!(rx.is_closed());
    }

    #[test]
    fn closed_writer_is_not_open() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let (_flushed_tx, flushed) = oneshot::channel();
        let mut conn = TransportConnection::detached();
        conn.attach(tx, flushed);
        drop(rx);
        assert!(!conn.is_open());
        conn.send("ignored".into());
    }

    #[tokio::test]
    async fn close_for_flush_hands_back_writer_signal() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let (flushed_tx, flushed) = oneshot::channel();
        let mut conn = TransportConnection::detached();
        conn.attach(tx, flushed);
        conn.send("last".into());

        let signal = conn.close_for_flush().unwrap();
        assert!(conn.close_for_flush().is_none());

        // Stand-in writer: drain, then report.
        assert_eq!(rx.recv().await.as_deref(), Some("last"));
        assert_eq!(rx.recv().await, None);
        flushed_tx.send(()).unwrap();
        assert!(signal.await.is_ok());
    }
}

//! `WebSocket` transport built on `tokio-tungstenite`.
//!
//! Each opened connection is split into a writer task (fed by the link's
//! outbound channel) and a reader task (feeding the link's event channel).

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{ClientError, ClientResult};
use crate::protocol::close_code;
use crate::transport::{Connector, TransportEvent, TransportLink};

/// Type alias for the `WebSocket` stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] that opens real `WebSocket` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> ClientResult<TransportLink> {
        let (ws, _response) = connect_async(url).await.map_err(classify_handshake_error)?;
        let (writer, reader) = ws.split();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (flushed_tx, flushed) = oneshot::channel();
        // Receiver is held locally, so this cannot fail.
        let _ = event_tx.send(TransportEvent::Opened);

        tokio::spawn(run_writer(writer, outbound_rx, flushed_tx));
        tokio::spawn(run_reader(reader, event_tx));

        Ok(TransportLink {
            outbound: outbound_tx,
            events: event_rx,
            flushed,
        })
    }
}

/// Map a failed handshake, singling out a 401 from the upgrade request.
fn classify_handshake_error(err: tungstenite::Error) -> ClientError {
    if matches!(&err, tungstenite::Error::Http(response) if response.status().as_u16() == 401) {
        return ClientError::Unauthorized;
    }
    ClientError::from(err)
}

/// Forward outbound frames until every sender is dropped, then close and
/// report on `flushed`.
async fn run_writer(
    mut writer: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    flushed: oneshot::Sender<()>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        if let Err(e) = writer.send(Message::Text(frame.into())).await {
            warn!(error = %e, "WebSocket write failed");
            return;
        }
    }

    debug!("Outbound channel closed, sending close frame");
    let frame = CloseFrame {
        code: close_code::NORMAL.into(),
        reason: "client closing".into(),
    };
    let _ = writer.send(Message::Close(Some(frame))).await;
    let _ = writer.close().await;
    let _ = flushed.send(());
}

/// Translate socket messages into [`TransportEvent`]s.
///
/// Exits on the first terminal event, or as soon as the link's event
/// receiver is dropped.
async fn run_reader(
    mut reader: SplitStream<WsStream>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = event_tx.closed() => {
                trace!("Event receiver dropped, reader exiting");
                return;
            }
            next = reader.next() => next,
        };

        let event = match next {
            Some(Ok(Message::Text(text))) => {
                TransportEvent::FrameReceived(text.as_bytes().to_vec())
            },
            Some(Ok(Message::Binary(bytes))) => TransportEvent::FrameReceived(bytes.to_vec()),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((close_code::ABNORMAL, String::new()), |f| {
                    (f.code.into(), f.reason.to_string())
                });
                let _ = event_tx.send(TransportEvent::Closed { code, reason });
                return;
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                // Control frames are answered by tungstenite.
                continue;
            },
            Some(Err(e)) => {
                let _ = event_tx.send(TransportEvent::TransportError {
                    detail: e.to_string(),
                });
                return;
            },
            None => {
                let _ = event_tx.send(TransportEvent::Closed {
                    code: close_code::ABNORMAL,
                    reason: "stream ended without close frame".to_owned(),
                });
                return;
            },
        };

        if event_tx.send(event).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_http_handshake_errors_stay_transport_errors() {
        let err = classify_handshake_error(tungstenite::Error::ConnectionClosed);
        assert!(matches!(err, ClientError::WebSocket(_)));
    }

    #[tokio::test]
    async fn open_fails_against_closed_port() {
        // Port 9 (discard) is reliably closed in test environments.
        let result = WsConnector.open("ws://127.0.0.1:9/ws?token=x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn queued_frames_are_written_before_flush_completes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut texts = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => texts.push(text.as_str().to_owned()),
                    Message::Close(_) => break,
                    _ => {},
                }
            }
            texts
        });

        let TransportLink {
            outbound,
            events: _events,
            flushed,
        } = WsConnector
            .open(&format!("ws://{addr}/ws?token=t"))
            .await
            .unwrap();
        outbound.send("one".into()).unwrap();
        outbound.send("two".into()).unwrap();
        drop(outbound);

        flushed.await.unwrap();
        assert_eq!(server.await.unwrap(), ["one", "two"]);
    }
}

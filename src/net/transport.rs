//! Transport contract and WebSocket client
//!
//! The session talks to a [`Transport`] for outbound text and receives
//! [`TransportEvent`]s for everything coming back. The WebSocket
//! implementation runs a reader and a writer task on top of tokio-tungstenite.

use tokio::sync::mpsc;

/// Inbound notifications from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established; the session replies with `INIT`
    Connected,
    /// One text message
    Message(String),
    /// Connection gone, with the close reason if the peer gave one
    Closed(Option<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,
    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Outbound half of a connection
pub trait Transport: Send {
    /// Queue one text message for sending
    fn send(&mut self, text: String) -> Result<(), TransportError>;
}

/// Transport that forwards outbound text into a channel
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self { outbound }
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound.send(text).map_err(|_| TransportError::Closed)
    }
}

/// A live connection: the outbound transport plus the inbound event stream
#[derive(Debug)]
pub struct Link {
    pub transport: ChannelTransport,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// In-memory peer for a [`Link`], standing in for the server
#[derive(Debug)]
pub struct LoopbackPeer {
    pub events: mpsc::Sender<TransportEvent>,
    pub sent: mpsc::UnboundedReceiver<String>,
}

impl LoopbackPeer {
    /// Deliver a server message to the session
    pub async fn deliver(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.events
            .send(TransportEvent::Message(text.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// Connected link/peer pair with no network underneath
pub fn loopback(capacity: usize) -> (Link, LoopbackPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (ev_tx, ev_rx) = mpsc::channel(capacity);
    (
        Link {
            transport: ChannelTransport::new(out_tx),
            events: ev_rx,
        },
        LoopbackPeer {
            events: ev_tx,
            sent: out_rx,
        },
    )
}

#[cfg(feature = "websocket")]
pub use self::websocket::connect;

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use tokio::sync::mpsc;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;
    use tracing::{debug, info, warn};

    use super::{ChannelTransport, Link, TransportError, TransportEvent};

    /// Open a WebSocket connection and spawn its reader and writer tasks.
    ///
    /// The first event on the returned link is always `Connected`.
    pub async fn connect(url: &str, capacity: usize) -> Result<Link, TransportError> {
        let (ws, _response) = connect_async(url).await?;
        info!("Connected to {}", url);

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (ev_tx, ev_rx) = mpsc::channel(capacity.max(1));

        ev_tx
            .send(TransportEvent::Connected)
            .await
            .map_err(|_| TransportError::Closed)?;

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("WebSocket send failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("WebSocket writer stopped");
        });

        tokio::spawn(async move {
            let mut reason = None;
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if ev_tx.send(TransportEvent::Message(text.as_str().to_owned())).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        reason = frame.map(|f| f.reason.as_str().to_owned());
                        break;
                    }
                    Ok(Message::Binary(data)) => {
                        debug!("Ignoring {} byte binary frame", data.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket receive failed: {}", e);
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }
            let _ = ev_tx.send(TransportEvent::Closed(reason)).await;
        });

        Ok(Link {
            transport: ChannelTransport::new(out_tx),
            events: ev_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let (mut link, mut peer) = loopback(8);

        tokio_test::assert_ok!(link.transport.send("INIT".to_string()));
        assert_eq!(peer.sent.recv().await.as_deref(), Some("INIT"));

        peer.deliver("DISCONNECT\nx").await.unwrap();
        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Message("DISCONNECT\nx".to_string()))
        );
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (mut link, peer) = loopback(1);
        drop(peer);
        let err = tokio_test::assert_err!(link.transport.send("MOVE\nU".to_string()));
        assert!(matches!(err, TransportError::Closed));
    }
}

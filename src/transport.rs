/// file: src/transport.rs
/// description: Duplex text transport seam and its WebSocket implementation
use crate::error::{AuctionRealtimeError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    /// Remote close or transport error, with a reason when one is known.
    Closed(Option<String>),
}

/// An open transport. Dropping `outbound` closes the connection.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<TransportLink>;
}

#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink> {
        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| {
            error!("Failed to connect to WebSocket: {}", e);
            AuctionRealtimeError::WebSocketError(e)
        })?;

        info!("WebSocket connection established to {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = read.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                if inbound_tx.send(TransportEvent::Text(text.as_str().to_owned())).is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(bytes))) => {
                                let text = String::from_utf8_lossy(&bytes).into_owned();
                                if inbound_tx.send(TransportEvent::Text(text)).is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                trace!("Received ping, sending pong");
                                if let Err(e) = write.send(Message::Pong(payload)).await {
                                    warn!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                info!("Received close frame: {:?}", frame);
                                let reason = frame.map(|f| f.reason.as_str().to_owned());
                                let _ = inbound_tx.send(TransportEvent::Closed(reason));
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("WebSocket stream error: {}", e);
                                let _ = inbound_tx.send(TransportEvent::Closed(Some(e.to_string())));
                                break;
                            }
                            None => {
                                info!("WebSocket stream ended");
                                let _ = inbound_tx.send(TransportEvent::Closed(None));
                                break;
                            }
                        }
                    }
                    outgoing = outbound_rx.recv() => {
                        match outgoing {
                            Some(text) => {
                                if let Err(e) = write.send(Message::Text(text.into())).await {
                                    error!("Failed to send frame: {}", e);
                                    let _ = inbound_tx.send(TransportEvent::Closed(Some(e.to_string())));
                                    break;
                                }
                            }
                            None => {
                                debug!("Outbound side dropped, closing WebSocket");
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use auction_realtime::auth::StaticToken;
use auction_realtime::channel::RealtimeChannel;
use auction_realtime::config::ChannelConfig;
use auction_realtime::error::{AuctionRealtimeError, Result};
use auction_realtime::events::EventSender;
use auction_realtime::stomp::{StompCommand, StompFrame};
use auction_realtime::transport::{Transport, TransportEvent, TransportLink};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

#[derive(Default)]
struct ServerState {
    refuse_opens: u32,
    opens: u32,
    received: Vec<StompFrame>,
    connection: Option<Connection>,
    next_message_id: u64,
}

struct Connection {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    /// subscription id -> destination
    subscriptions: HashMap<String, String>,
}

/// In-memory STOMP broker behind the transport seam. Accepts every CONNECT
/// with heart-beating off and records what the client sends.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<ServerState>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` opens fail at the transport level.
    pub fn refuse_next_opens(&self, count: u32) {
        self.state.lock().unwrap().refuse_opens = count;
    }

    pub fn opens(&self) -> u32 {
        self.state.lock().unwrap().opens
    }

    pub fn count(&self, command: StompCommand) -> usize {
        self.state
            .lock()
            .unwrap()
            .received
            .iter()
            .filter(|f| f.command == command)
            .count()
    }

    pub fn frames(&self, command: StompCommand) -> Vec<StompFrame> {
        self.state
            .lock()
            .unwrap()
            .received
            .iter()
            .filter(|f| f.command == command)
            .cloned()
            .collect()
    }

    /// Destinations the live connection is subscribed to, sorted.
    pub fn subscribed(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut topics: Vec<String> = state
            .connection
            .as_ref()
            .map(|c| c.subscriptions.values().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connection.is_some()
    }

    /// Sends a MESSAGE to the live connection if it subscribed `destination`.
    pub fn publish(&self, destination: &str, body: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.next_message_id += 1;
        let message_id = state.next_message_id;
        let Some(connection) = state.connection.as_ref() else {
            return false;
        };
        let Some(id) = connection
            .subscriptions
            .iter()
            .find(|(_, dest)| dest.as_str() == destination)
            .map(|(id, _)| id.clone())
        else {
            return false;
        };

        let frame = StompFrame::new(StompCommand::Message)
            .with_header("destination", destination)
            .with_header("subscription", id)
            .with_header("message-id", message_id.to_string())
            .with_header("content-type", "application/json")
            .with_body(body);
        connection
            .to_client
            .send(TransportEvent::Text(frame.encode()))
            .is_ok()
    }

    /// Server-side close of the live connection.
    pub fn drop_connection(&self) {
        if let Some(connection) = self.state.lock().unwrap().connection.take() {
            let _ = connection
                .to_client
                .send(TransportEvent::Closed(Some("server restart".into())));
        }
    }

    fn handle_client_text(state: &Arc<Mutex<ServerState>>, text: &str) {
        let Ok(frames) = StompFrame::decode_all(text) else {
            return;
        };
        let mut state = state.lock().unwrap();
        for frame in frames {
            if let Some(connection) = state.connection.as_mut() {
                match frame.command {
                    StompCommand::Connect => {
                        let connected = StompFrame::new(StompCommand::Connected)
                            .with_header("version", "1.2")
                            .with_header("heart-beat", "0,0");
                        let _ = connection.to_client.send(TransportEvent::Text(connected.encode()));
                    }
                    StompCommand::Subscribe => {
                        if let (Some(id), Some(dest)) = (frame.header("id"), frame.header("destination")) {
                            connection.subscriptions.insert(id.to_string(), dest.to_string());
                        }
                    }
                    StompCommand::Unsubscribe => {
                        if let Some(id) = frame.header("id") {
                            connection.subscriptions.remove(id);
                        }
                    }
                    _ => {}
                }
            }
            let disconnecting = frame.command == StompCommand::Disconnect;
            state.received.push(frame);
            if disconnecting {
                state.connection = None;
            }
        }
    }
}

#[async_trait]
impl Transport for FakeBroker {
    async fn open(&self, _url: &Url) -> Result<TransportLink> {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, mut from_client) = mpsc::unbounded_channel::<String>();
        {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            if state.refuse_opens > 0 {
                state.refuse_opens -= 1;
                return Err(AuctionRealtimeError::ConnectionClosed);
            }
            state.connection = Some(Connection {
                to_client,
                subscriptions: HashMap::new(),
            });
        }

        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(text) = from_client.recv().await {
                FakeBroker::handle_client_text(&state, &text);
            }
        });

        Ok(TransportLink { outbound, inbound })
    }
}

pub fn test_config() -> ChannelConfig {
    let mut config = ChannelConfig::new(Url::parse("ws://broker.test/ws").unwrap());
    config.heartbeat = Duration::ZERO;
    config
}

pub fn channel_with(broker: &FakeBroker, events: Option<EventSender>) -> RealtimeChannel {
    RealtimeChannel::new(
        test_config(),
        Arc::new(broker.clone()),
        Arc::new(StaticToken(Some("test-token".into()))),
        events,
    )
}

/// Polls `condition` while letting spawned tasks run.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

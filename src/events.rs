/// file: src/events.rs
/// description: Event bus decoupling the realtime layer from terminal presentation
use crate::notifier::DesktopNotification;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Starting,
    Connecting { url: String },
    Connected { connection_id: String },
    Subscribed { topic: String },
    Unsubscribed { topic: String },
    FrameDropped { topic: String, reason: String },
    ServerError { message: String },
    ConnectionFailed(String),
    Reconnecting { attempt: u32, delay_ms: u64 },
    ReconnectExhausted { attempts: u32 },
    Disconnected,
    DesktopNotification(Arc<DesktopNotification>),
    UnreadCount { count: u64 },
    SseError(String),
    FeedError { feed: &'static str, message: String },
    Stopping,
}

// Bounded so a stalled UI cannot grow memory without limit
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub type EventSender = mpsc::Sender<ClientEvent>;
pub type EventReceiver = mpsc::Receiver<ClientEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Non-blocking publish. A full or closed bus drops the event.
pub fn publish(sender: Option<&EventSender>, event: ClientEvent) {
    if let Some(tx) = sender
        && let Err(e) = tx.try_send(event)
    {
        debug!("event bus rejected event: {}", e);
    }
}

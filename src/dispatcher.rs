/// file: src/dispatcher.rs
/// description: Routes STOMP MESSAGE frames to topic listeners after one validated parse
use crate::monitoring::{FRAMES_DROPPED_COUNTER, FRAMES_RECEIVED_COUNTER};
use crate::protocol::InboundMessage;
use crate::registry::{MessageCallback, SubscriptionRegistry};
use crate::stomp::StompFrame;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Delivered { topic: String, listeners: usize },
    Dropped { topic: String, reason: String },
}

/// Resolves listeners by `subscription` header, falling back to `destination`.
/// Runs under the registry lock; the returned callbacks are invoked after it is released.
pub fn route(registry: &SubscriptionRegistry, frame: &StompFrame) -> Option<(String, Vec<MessageCallback>)> {
    if let Some(id) = frame.header("subscription")
        && let Some(topic) = registry.topic_for_subscription(id)
    {
        return Some((topic.to_string(), registry.listeners_for_subscription(id)));
    }

    let destination = frame.header("destination")?;
    let listeners = registry.listeners_for_destination(destination);
    if listeners.is_empty() {
        return None;
    }
    Some((destination.to_string(), listeners))
}

/// Parses `body` once and hands the message to every listener in order.
/// A body that fails to parse is logged and dropped.
pub fn deliver(topic: &str, body: &str, listeners: &[MessageCallback]) -> Dispatch {
    FRAMES_RECEIVED_COUNTER.increment(1);

    let message = match InboundMessage::parse(body) {
        Ok(message) => message,
        Err(e) => {
            FRAMES_DROPPED_COUNTER.increment(1);
            warn!(topic, error = %e, "Dropping unparseable frame");
            debug!(topic, body, "Dropped frame body");
            return Dispatch::Dropped {
                topic: topic.to_string(),
                reason: e.to_string(),
            };
        }
    };

    trace!(topic, kind = ?message.kind, listeners = listeners.len(), "Dispatching message");
    for listener in listeners {
        listener(&message);
    }

    Dispatch::Delivered {
        topic: topic.to_string(),
        listeners: listeners.len(),
    }
}

/// file: src/registry.rs
/// description: Topic -> listener bookkeeping with at most one transport subscription per topic
use crate::protocol::InboundMessage;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub type MessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

const DEFAULT_LISTENER: &str = "default";

/// Identity a callback is registered under on a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerKey(String);

impl ListenerKey {
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn unique() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ListenerKey {
    fn default() -> Self {
        Self(DEFAULT_LISTENER.to_string())
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport-level subscription, i.e. a STOMP subscription id bound to a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: String,
    pub topic: String,
}

struct TopicEntry {
    listeners: Vec<(ListenerKey, MessageCallback)>,
    handle: Option<SubscriptionHandle>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    topics: BTreeMap<String, TopicEntry>,
    by_id: HashMap<String, String>,
    next_id: u64,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topics.keys().collect::<Vec<_>>())
            .field("active", &self.by_id.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `callback` under `key`. A key already present on the topic has its
    /// callback replaced. Returns true when the listener is new.
    pub fn store(&mut self, topic: &str, key: ListenerKey, callback: MessageCallback) -> bool {
        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicEntry {
                listeners: Vec::new(),
                handle: None,
            });

        match entry.listeners.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => {
                slot.1 = callback;
                false
            }
            None => {
                entry.listeners.push((key, callback));
                true
            }
        }
    }

    pub fn is_active(&self, topic: &str) -> bool {
        self.handle(topic).is_some()
    }

    pub fn handle(&self, topic: &str) -> Option<&SubscriptionHandle> {
        self.topics.get(topic).and_then(|entry| entry.handle.as_ref())
    }

    pub fn has_listener(&self, topic: &str, key: &ListenerKey) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|entry| entry.listeners.iter().any(|(k, _)| k == key))
    }

    /// Allocates a transport handle for a topic that has listeners but none yet.
    pub fn activate(&mut self, topic: &str) -> Option<SubscriptionHandle> {
        let entry = self.topics.get_mut(topic)?;
        if entry.handle.is_some() || entry.listeners.is_empty() {
            return None;
        }

        let handle = SubscriptionHandle {
            id: format!("sub-{}", self.next_id),
            topic: topic.to_string(),
        };
        self.next_id += 1;
        self.by_id.insert(handle.id.clone(), topic.to_string());
        entry.handle = Some(handle.clone());
        Some(handle)
    }

    /// Activates every pending topic. Returns the handles the transport must open.
    pub fn restore(&mut self) -> Vec<SubscriptionHandle> {
        self.pending_topics()
            .into_iter()
            .filter_map(|topic| self.activate(&topic))
            .collect()
    }

    /// Removes one listener. When it was the last one the topic is dropped and
    /// its handle, if any, is returned for cancellation.
    pub fn remove_listener(&mut self, topic: &str, key: &ListenerKey) -> Option<SubscriptionHandle> {
        let entry = self.topics.get_mut(topic)?;
        entry.listeners.retain(|(k, _)| k != key);
        if !entry.listeners.is_empty() {
            return None;
        }
        self.remove_topic(topic)
    }

    /// Drops every listener of `topic` and returns its handle, if any.
    pub fn remove_topic(&mut self, topic: &str) -> Option<SubscriptionHandle> {
        let handle = self.topics.remove(topic)?.handle?;
        self.by_id.remove(&handle.id);
        Some(handle)
    }

    /// Forgets every transport handle while keeping callbacks, for a lost connection.
    pub fn release_handles(&mut self) -> usize {
        let released = self.by_id.len();
        for entry in self.topics.values_mut() {
            entry.handle = None;
        }
        self.by_id.clear();
        released
    }

    /// Drops listeners and handles alike. Returns the handles that were active.
    pub fn clear(&mut self) -> Vec<SubscriptionHandle> {
        let handles = self
            .topics
            .values_mut()
            .filter_map(|entry| entry.handle.take())
            .collect();
        self.topics.clear();
        self.by_id.clear();
        handles
    }

    pub fn listeners_for_subscription(&self, id: &str) -> Vec<MessageCallback> {
        self.by_id
            .get(id)
            .map(|topic| self.listeners_for_destination(topic))
            .unwrap_or_default()
    }

    pub fn listeners_for_destination(&self, topic: &str) -> Vec<MessageCallback> {
        self.topics
            .get(topic)
            .map(|entry| entry.listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub fn topic_for_subscription(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn active_topics(&self) -> Vec<String> {
        self.topics
            .iter()
            .filter(|(_, entry)| entry.handle.is_some())
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub fn pending_topics(&self) -> Vec<String> {
        self.topics
            .iter()
            .filter(|(_, entry)| entry.handle.is_none() && !entry.listeners.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn active_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |entry| entry.listeners.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> MessageCallback {
        Arc::new(|_: &InboundMessage| {})
    }

    fn assert_callbacks_cover_handles(registry: &SubscriptionRegistry) {
        for topic in registry.active_topics() {
            assert!(registry.listener_count(&topic) > 0, "{topic} active without listener");
        }
    }

    #[test]
    fn test_activate_once_per_topic() {
        let mut registry = SubscriptionRegistry::new();
        registry.store("/topic/bid/1", ListenerKey::default(), noop());

        let first = registry.activate("/topic/bid/1");
        let second = registry.activate("/topic/bid/1");

        assert_eq!(first.map(|h| h.id), Some("sub-0".to_string()));
        assert!(second.is_none());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_shared_topic_handle_released_by_last_listener() {
        let mut registry = SubscriptionRegistry::new();
        let a = ListenerKey::unique();
        let b = ListenerKey::unique();
        registry.store("/user/queue/notifications", a.clone(), noop());
        registry.store("/user/queue/notifications", b.clone(), noop());
        registry.activate("/user/queue/notifications");

        assert!(registry.remove_listener("/user/queue/notifications", &a).is_none());
        assert!(registry.is_active("/user/queue/notifications"));

        let handle = registry.remove_listener("/user/queue/notifications", &b);
        assert_eq!(handle.map(|h| h.topic), Some("/user/queue/notifications".to_string()));
        assert_eq!(registry.topic_count(), 0);
        assert_callbacks_cover_handles(&registry);
    }

    #[test]
    fn test_release_keeps_callbacks_and_restore_reactivates() {
        let mut registry = SubscriptionRegistry::new();
        registry.store("/topic/a", ListenerKey::default(), noop());
        registry.store("/topic/b", ListenerKey::default(), noop());
        registry.restore();
        assert_eq!(registry.active_count(), 2);

        assert_eq!(registry.release_handles(), 2);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.pending_topics(), vec!["/topic/a", "/topic/b"]);
        assert_callbacks_cover_handles(&registry);

        let restored = registry.restore();
        assert_eq!(restored.len(), 2);
        assert!(registry.pending_topics().is_empty());
        assert_callbacks_cover_handles(&registry);
    }

    #[test]
    fn test_fan_out_by_subscription_id() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = SubscriptionRegistry::new();
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            registry.store(
                "/topic/home-updates",
                ListenerKey::unique(),
                Arc::new(move |_: &InboundMessage| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        let handle = registry.activate("/topic/home-updates").unwrap();

        let message = InboundMessage::parse(r#"{"type":"CHAT","content":"hi"}"#).unwrap();
        for callback in registry.listeners_for_subscription(&handle.id) {
            callback(&message);
        }

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(registry.listeners_for_subscription("sub-99").is_empty());
    }

    #[test]
    fn test_store_same_key_replaces_callback() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.store("/topic/a", ListenerKey::default(), noop()));
        assert!(!registry.store("/topic/a", ListenerKey::default(), noop()));
        assert_eq!(registry.listener_count("/topic/a"), 1);
    }

    #[test]
    fn test_clear_returns_active_handles() {
        let mut registry = SubscriptionRegistry::new();
        registry.store("/topic/a", ListenerKey::default(), noop());
        registry.store("/topic/b", ListenerKey::default(), noop());
        registry.activate("/topic/a");

        let handles = registry.clear();
        assert_eq!(handles.len(), 1);
        assert_eq!(registry.topic_count(), 0);
        assert!(registry.topic_for_subscription("sub-0").is_none());
    }
}

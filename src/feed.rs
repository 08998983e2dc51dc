/// file: src/feed.rs
/// description: Generic topic-driven view state shared by every feature feed
use crate::channel::RealtimeChannel;
use crate::notifier::{self, DesktopNotification, DesktopNotifier};
use crate::protocol::InboundMessage;
use crate::registry::{ListenerKey, MessageCallback};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// What a reducer did with one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub changed: bool,
    pub notifications: Vec<DesktopNotification>,
}

impl Outcome {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn changed() -> Self {
        Self {
            changed: true,
            notifications: Vec::new(),
        }
    }

    pub fn when(changed: bool) -> Self {
        Self {
            changed,
            notifications: Vec::new(),
        }
    }

    pub fn notify(mut self, notification: DesktopNotification) -> Self {
        self.notifications.push(notification);
        self
    }
}

/// Pure fold of inbound messages into a feature's view state.
pub trait FeedReducer: Send + Sync + 'static {
    type State: Clone + Default + Send + Sync + 'static;

    /// Short name used in logs and events.
    const NAME: &'static str;

    fn reduce(
        &self,
        state: &mut Self::State,
        topic: &str,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome;

    /// Period of the local tick, if the feed has one.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    fn tick(&self, _state: &mut Self::State, _now: DateTime<Utc>) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedView<S> {
    pub data: S,
    pub error: Option<String>,
    pub is_subscribed: bool,
}

struct Subscriptions {
    topics: Vec<String>,
    ticker: Option<JoinHandle<()>>,
}

/// Owns one reducer's state and its listener registrations on the channel.
/// All topics of a feed share one listener key; dropping the feed unsubscribes.
pub struct TopicFeed<R: FeedReducer> {
    channel: RealtimeChannel,
    reducer: Arc<R>,
    notifier: Arc<dyn DesktopNotifier>,
    key: ListenerKey,
    view: Arc<watch::Sender<FeedView<R::State>>>,
    subscriptions: Mutex<Subscriptions>,
}

impl<R: FeedReducer> TopicFeed<R> {
    pub fn new(channel: RealtimeChannel, reducer: R, notifier: Arc<dyn DesktopNotifier>) -> Self {
        let (view, _) = watch::channel(FeedView::default());
        Self {
            channel,
            reducer: Arc::new(reducer),
            notifier,
            key: ListenerKey::unique(),
            view: Arc::new(view),
            subscriptions: Mutex::new(Subscriptions {
                topics: Vec::new(),
                ticker: None,
            }),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, Subscriptions> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn callback(&self, topic: &str) -> MessageCallback {
        let reducer = Arc::clone(&self.reducer);
        let view = Arc::clone(&self.view);
        let notifier = Arc::clone(&self.notifier);
        let topic = topic.to_string();

        Arc::new(move |message: &InboundMessage| {
            let now = Utc::now();
            let mut notifications = Vec::new();
            view.send_if_modified(|view| {
                let outcome = reducer.reduce(&mut view.data, &topic, message, now);
                notifications = outcome.notifications;
                outcome.changed
            });
            trace!(feed = R::NAME, %topic, kind = ?message.kind, "Reduced message");
            for notification in &notifications {
                notifier::deliver(notifier.as_ref(), notification);
            }
        })
    }

    /// Adds listeners for `topics`. Topics already held are skipped.
    pub fn subscribe(&self, topics: &[String]) {
        let mut subs = self.subscriptions();
        for topic in topics {
            if subs.topics.contains(topic) {
                continue;
            }
            self.channel
                .subscribe_as(topic, self.key.clone(), self.callback(topic));
            subs.topics.push(topic.clone());
        }

        if !subs.topics.is_empty() {
            if subs.ticker.is_none() {
                subs.ticker = self.spawn_ticker();
            }
            self.view.send_if_modified(|view| {
                let changed = !view.is_subscribed || view.error.is_some();
                view.is_subscribed = true;
                view.error = None;
                changed
            });
        }
        debug!(feed = R::NAME, topics = subs.topics.len(), "Feed subscribed");
    }

    pub fn add_topic(&self, topic: &str) {
        self.subscribe(&[topic.to_string()]);
    }

    pub fn remove_topic(&self, topic: &str) {
        let mut subs = self.subscriptions();
        if let Some(pos) = subs.topics.iter().position(|t| t == topic) {
            subs.topics.remove(pos);
            self.channel.remove_listener(topic, &self.key);
        }
        if subs.topics.is_empty() {
            Self::stop(&mut subs);
            self.view.send_if_modified(|view| std::mem::replace(&mut view.is_subscribed, false));
        }
    }

    /// Moves the feed to exactly `topics`, keeping listeners that stay.
    pub fn retarget(&self, topics: &[String]) {
        let stale: Vec<String> = self
            .topics()
            .into_iter()
            .filter(|t| !topics.contains(t))
            .collect();
        for topic in &stale {
            self.remove_topic(topic);
        }
        self.subscribe(topics);
    }

    /// Drops every listener this feed holds. State is kept.
    pub fn unsubscribe(&self) {
        let mut subs = self.subscriptions();
        for topic in subs.topics.drain(..) {
            self.channel.remove_listener(&topic, &self.key);
        }
        Self::stop(&mut subs);
        self.view.send_if_modified(|view| std::mem::replace(&mut view.is_subscribed, false));
    }

    fn stop(subs: &mut Subscriptions) {
        if let Some(ticker) = subs.ticker.take() {
            ticker.abort();
        }
    }

    fn spawn_ticker(&self) -> Option<JoinHandle<()>> {
        let period = self.reducer.tick_interval()?;
        let reducer = Arc::clone(&self.reducer);
        let view = Arc::clone(&self.view);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                view.send_if_modified(|view| reducer.tick(&mut view.data, now));
            }
        }))
    }

    pub fn topics(&self) -> Vec<String> {
        self.subscriptions().topics.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.view.borrow().is_subscribed
    }

    pub fn view(&self) -> FeedView<R::State> {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> R::State {
        self.view.borrow().data.clone()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView<R::State>> {
        self.view.subscribe()
    }

    /// Applies a pure state transition outside of message delivery.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut R::State) -> bool,
    {
        self.view.send_if_modified(|view| f(&mut view.data))
    }

    pub fn reset(&self, state: R::State) {
        self.view.send_modify(|view| view.data = state);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.view.send_if_modified(|view| {
            let changed = view.error != error;
            view.error = error;
            changed
        });
    }

    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }
}

impl<R: FeedReducer> Drop for TopicFeed<R> {
    fn drop(&mut self) {
        let mut subs = self.subscriptions();
        for topic in subs.topics.drain(..) {
            self.channel.remove_listener(&topic, &self.key);
        }
        Self::stop(&mut subs);
    }
}

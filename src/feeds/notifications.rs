/// file: src/feeds/notifications.rs
/// description: Capped notification inbox with read state and transient toasts
use crate::channel::RealtimeChannel;
use crate::config::FeedConfig;
use crate::feed::{FeedReducer, FeedView, Outcome, TopicFeed};
use crate::notifier::{DesktopNotification, DesktopNotifier};
use crate::protocol::{InboundMessage, NotificationKind, Payload, topics};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub product_id: Option<i64>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: String,
    pub title: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationsState {
    pub entries: Vec<NotificationEntry>,
    pub toasts: Vec<Toast>,
}

impl NotificationsState {
    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_read).count()
    }

    pub fn mark_as_read(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id && !e.is_read) {
            Some(entry) => {
                entry.is_read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_as_read(&mut self) -> bool {
        let mut changed = false;
        for entry in self.entries.iter_mut().filter(|e| !e.is_read) {
            entry.is_read = true;
            changed = true;
        }
        changed
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.entries.is_empty() || !self.toasts.is_empty();
        self.entries.clear();
        self.toasts.clear();
        changed
    }

    pub fn prune_toasts(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|toast| toast.expires_at > now);
        before != self.toasts.len()
    }
}

fn default_title(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::BidSuccess => "입찰 완료",
        NotificationKind::Outbid => "상위 입찰 발생",
        NotificationKind::AuctionWon => "낙찰 성공",
        NotificationKind::AuctionLost => "낙찰 실패",
        NotificationKind::AuctionEndingSoon => "경매 종료 임박",
        NotificationKind::AuctionEnd => "경매 종료",
        NotificationKind::Other => "알림",
    }
}

#[derive(Debug, Clone)]
pub struct NotificationsReducer {
    cap: usize,
    toast_ttl: Duration,
    tick: Duration,
}

impl NotificationsReducer {
    pub fn new(cap: usize, toast_ttl: Duration, tick: Duration) -> Self {
        Self {
            cap,
            toast_ttl,
            tick,
        }
    }
}

impl FeedReducer for NotificationsReducer {
    type State = NotificationsState;
    const NAME: &'static str = "notifications";

    fn reduce(
        &self,
        state: &mut NotificationsState,
        _topic: &str,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome {
        let Payload::Notification(notification) = &message.payload else {
            return Outcome::unchanged();
        };

        let kind = notification.kind();
        let title = notification
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(kind).to_string());
        let body = notification
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| message.content.clone());
        let id = notification
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        state.entries.insert(
            0,
            NotificationEntry {
                id: id.clone(),
                kind,
                title: title.clone(),
                message: body.clone(),
                product_id: notification.product_id,
                received_at: message.timestamp_or(now),
                is_read: false,
            },
        );
        state.entries.truncate(self.cap);

        let ttl = chrono::Duration::from_std(self.toast_ttl).unwrap_or_else(|_| chrono::Duration::seconds(5));
        state.toasts.push(Toast {
            id: id.clone(),
            title: title.clone(),
            message: body.clone(),
            expires_at: now + ttl,
        });

        Outcome::changed().notify(DesktopNotification::new(title, body).with_tag(id))
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(self.tick)
    }

    fn tick(&self, state: &mut NotificationsState, now: DateTime<Utc>) -> bool {
        state.prune_toasts(now)
    }
}

pub struct NotificationsFeed {
    feed: TopicFeed<NotificationsReducer>,
}

impl NotificationsFeed {
    pub fn new(
        channel: RealtimeChannel,
        notifier: Arc<dyn DesktopNotifier>,
        config: &FeedConfig,
    ) -> Self {
        let reducer = NotificationsReducer::new(
            config.notification_cap,
            config.toast_ttl,
            config.countdown_tick,
        );
        Self {
            feed: TopicFeed::new(channel, reducer, notifier),
        }
    }

    /// Subscribes the private notification queue.
    pub fn open(&self) {
        self.feed.add_topic(topics::USER_NOTIFICATIONS);
    }

    pub fn mark_as_read(&self, id: &str) -> bool {
        self.feed.update(|state| state.mark_as_read(id))
    }

    pub fn mark_all_as_read(&self) -> bool {
        self.feed.update(NotificationsState::mark_all_as_read)
    }

    pub fn clear_notifications(&self) -> bool {
        self.feed.update(NotificationsState::clear)
    }

    pub fn view(&self) -> FeedView<NotificationsState> {
        self.feed.view()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView<NotificationsState>> {
        self.feed.watch()
    }

    pub fn close(&self) {
        self.feed.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn reducer(cap: usize) -> NotificationsReducer {
        NotificationsReducer::new(cap, Duration::from_secs(5), Duration::from_secs(1))
    }

    fn notification(id: i64) -> InboundMessage {
        InboundMessage::parse(&format!(
            r#"{{"type":"NOTIFICATION","content":"알림 {id}","data":{{"id":{id},"type":"OUTBID"}}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let reducer = reducer(50);
        let mut state = NotificationsState::default();
        for id in 1..=51 {
            reducer.reduce(&mut state, topics::USER_NOTIFICATIONS, &notification(id), now());
        }

        assert_eq!(state.entries.len(), 50);
        assert_eq!(state.entries[0].id, "51");
        assert_eq!(state.entries[49].id, "2");
        assert!(state.entries.iter().all(|e| e.id != "1"));
    }

    #[test]
    fn test_entry_fields_and_desktop_effect() {
        let reducer = reducer(50);
        let mut state = NotificationsState::default();
        let outcome = reducer.reduce(&mut state, topics::USER_NOTIFICATIONS, &notification(3), now());

        let entry = &state.entries[0];
        assert_eq!(entry.title, "상위 입찰 발생");
        assert_eq!(entry.message, "알림 3");
        assert!(!entry.is_read);
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].tag.as_deref(), Some("3"));
    }

    #[test]
    fn test_toasts_dismiss_after_ttl() {
        let reducer = reducer(50);
        let mut state = NotificationsState::default();
        reducer.reduce(&mut state, topics::USER_NOTIFICATIONS, &notification(1), now());
        assert_eq!(state.toasts.len(), 1);

        assert!(!reducer.tick(&mut state, now() + chrono::Duration::seconds(4)));
        assert!(reducer.tick(&mut state, now() + chrono::Duration::seconds(5)));
        assert!(state.toasts.is_empty());
        assert_eq!(state.entries.len(), 1);
    }

    #[test]
    fn test_read_transitions() {
        let reducer = reducer(50);
        let mut state = NotificationsState::default();
        for id in 1..=3 {
            reducer.reduce(&mut state, topics::USER_NOTIFICATIONS, &notification(id), now());
        }
        assert_eq!(state.unread_count(), 3);

        assert!(state.mark_as_read("2"));
        assert!(!state.mark_as_read("2"));
        assert!(!state.mark_as_read("missing"));
        assert_eq!(state.unread_count(), 2);

        assert!(state.mark_all_as_read());
        assert!(!state.mark_all_as_read());
        assert_eq!(state.unread_count(), 0);

        assert!(state.clear());
        assert!(state.entries.is_empty());
        assert!(!state.clear());
    }

    #[test]
    fn test_non_notification_messages_are_ignored() {
        let reducer = reducer(50);
        let mut state = NotificationsState::default();
        let chat = InboundMessage::parse(r#"{"type":"CHAT","content":"hi"}"#).unwrap();
        assert!(!reducer.reduce(&mut state, topics::USER_NOTIFICATIONS, &chat, now()).changed);
    }
}

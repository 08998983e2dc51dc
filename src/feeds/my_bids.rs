/// file: src/feeds/my_bids.rs
/// description: Per-user view of every product the user has bid on
use super::upsert;
use crate::api::{AuctionApi, MyBidSummary};
use crate::channel::RealtimeChannel;
use crate::feed::{FeedReducer, FeedView, Outcome, TopicFeed};
use crate::notifier::{DesktopNotification, DesktopNotifier};
use crate::protocol::{
    InboundMessage, NotificationKind, NotificationPayload, Payload, topics,
};
use crate::status::AuctionStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyBidUpdate {
    pub product_id: i64,
    pub product_name: Option<String>,
    pub current_price: Option<i64>,
    pub my_bid_amount: Option<i64>,
    pub bid_count: Option<u64>,
    pub last_bidder: Option<String>,
    pub is_outbid: bool,
    pub status: AuctionStatus,
    pub last_event: Option<NotificationKind>,
    pub updated_at: DateTime<Utc>,
}

impl MyBidUpdate {
    pub fn new(product_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            product_id,
            product_name: None,
            current_price: None,
            my_bid_amount: None,
            bid_count: None,
            last_bidder: None,
            is_outbid: false,
            status: AuctionStatus::Bidding,
            last_event: None,
            updated_at: now,
        }
    }

    pub fn from_summary(summary: &MyBidSummary, now: DateTime<Utc>) -> Self {
        Self {
            product_name: summary.product_name.clone(),
            current_price: summary.current_price.or(summary.bid_amount),
            my_bid_amount: summary.bid_amount,
            status: summary
                .status
                .as_deref()
                .and_then(AuctionStatus::from_code)
                .unwrap_or_default(),
            ..Self::new(summary.product_id, now)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MyBidsState {
    pub user_id: Option<i64>,
    pub entries: Vec<MyBidUpdate>,
}

impl MyBidsState {
    pub fn entry(&self, product_id: i64) -> Option<&MyBidUpdate> {
        self.entries.iter().find(|e| e.product_id == product_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MyBidsReducer;

impl MyBidsReducer {
    fn apply_notification(
        state: &mut MyBidsState,
        notification: &NotificationPayload,
        content: &str,
        now: DateTime<Utc>,
    ) -> Outcome {
        let Some(product_id) = notification.product_id else {
            return Outcome::unchanged();
        };
        let kind = notification.kind();
        if kind == NotificationKind::Other {
            return Outcome::unchanged();
        }

        upsert(
            &mut state.entries,
            product_id,
            |e| e.product_id,
            || MyBidUpdate::new(product_id, now),
            |entry| {
                if notification.product_name.is_some() {
                    entry.product_name = notification.product_name.clone();
                }
                match kind {
                    NotificationKind::BidSuccess => {
                        entry.my_bid_amount = notification.bid_amount.or(notification.current_price);
                        entry.current_price = notification
                            .current_price
                            .or(notification.bid_amount)
                            .or(entry.current_price);
                        entry.is_outbid = false;
                    }
                    NotificationKind::Outbid => {
                        entry.current_price = notification.current_price.or(entry.current_price);
                        entry.is_outbid = true;
                    }
                    NotificationKind::AuctionWon => {
                        entry.status = AuctionStatus::Successful;
                        entry.is_outbid = false;
                    }
                    NotificationKind::AuctionLost => entry.status = AuctionStatus::Failed,
                    NotificationKind::AuctionEndingSoon if !entry.status.is_closed() => {
                        entry.status = AuctionStatus::EndingSoon;
                    }
                    NotificationKind::AuctionEnd if !entry.status.is_terminal() => {
                        entry.status = AuctionStatus::Ended;
                    }
                    _ => {}
                }
                entry.last_event = Some(kind);
                entry.updated_at = now;
            },
        );

        let body = notification
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| content.to_string());
        let name = notification.product_name.as_deref().unwrap_or("상품");
        match kind {
            NotificationKind::Outbid => Outcome::changed().notify(
                DesktopNotification::new(format!("{name}: 상위 입찰 발생"), body)
                    .with_tag(format!("outbid-{product_id}")),
            ),
            NotificationKind::AuctionWon => Outcome::changed().notify(
                DesktopNotification::new(format!("{name}: 낙찰 성공"), body)
                    .with_tag(format!("won-{product_id}")),
            ),
            _ => Outcome::changed(),
        }
    }
}

impl FeedReducer for MyBidsReducer {
    type State = MyBidsState;
    const NAME: &'static str = "my-bids";

    fn reduce(
        &self,
        state: &mut MyBidsState,
        topic: &str,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome {
        let Some(user_id) = state.user_id else {
            return Outcome::unchanged();
        };

        if topic == topics::USER_NOTIFICATIONS {
            return match &message.payload {
                Payload::Notification(n) => Self::apply_notification(state, n, &message.content, now),
                _ => Outcome::unchanged(),
            };
        }

        let Some(product_id) = message.product_id().or_else(|| topics::product_id_of(topic)) else {
            return Outcome::unchanged();
        };

        match &message.payload {
            Payload::Bid(bid) => {
                upsert(
                    &mut state.entries,
                    product_id,
                    |e| e.product_id,
                    || MyBidUpdate::new(product_id, now),
                    |entry| {
                        entry.current_price = Some(bid.current_price);
                        if bid.bid_count.is_some() {
                            entry.bid_count = bid.bid_count;
                        }
                        entry.last_bidder = bid.last_bidder.clone();
                        if bid.product_name.is_some() {
                            entry.product_name = bid.product_name.clone();
                        }
                        if bid.bidder_id == Some(user_id) {
                            entry.my_bid_amount = Some(bid.current_price);
                            entry.is_outbid = false;
                        } else if let Some(mine) = entry.my_bid_amount {
                            entry.is_outbid = bid.current_price > mine;
                        }
                        entry.updated_at = now;
                    },
                );
                Outcome::changed()
            }
            Payload::Status(status) => {
                let mut status_changed = false;
                let inserted = upsert(
                    &mut state.entries,
                    product_id,
                    |e| e.product_id,
                    || MyBidUpdate::new(product_id, now),
                    |entry| {
                        let resolved =
                            AuctionStatus::resolve(status.status.as_deref(), &message.content, entry.status);
                        status_changed = resolved != entry.status;
                        entry.status = resolved;
                        if status_changed {
                            entry.updated_at = now;
                        }
                    },
                );
                Outcome::when(inserted || status_changed)
            }
            _ => Outcome::unchanged(),
        }
    }
}

/// Products the user bid on, discovered over REST and kept live over the channel.
pub struct MyBidsFeed {
    feed: TopicFeed<MyBidsReducer>,
    api: Arc<dyn AuctionApi>,
}

impl MyBidsFeed {
    pub fn new(
        channel: RealtimeChannel,
        api: Arc<dyn AuctionApi>,
        notifier: Arc<dyn DesktopNotifier>,
    ) -> Self {
        Self {
            feed: TopicFeed::new(channel, MyBidsReducer, notifier),
            api,
        }
    }

    /// Sets the logged-in user.
    ///
    /// The same id again leaves the live subscriptions alone. A different id
    /// reloads the bid list and resubscribes, and `None` tears everything down.
    /// The REST discovery call completes before any product topic is subscribed.
    pub async fn set_user(&self, user_id: Option<i64>) {
        let current = self.feed.view().data.user_id;
        if user_id.is_some() && current == user_id && self.feed.is_subscribed() {
            return;
        }

        self.feed.unsubscribe();
        let Some(user_id) = user_id else {
            self.feed.reset(MyBidsState::default());
            self.feed.set_error(Some("user id is required".to_string()));
            return;
        };

        self.feed.reset(MyBidsState {
            user_id: Some(user_id),
            entries: Vec::new(),
        });

        let bids = match self.api.my_bids().await {
            Ok(bids) => bids,
            Err(e) => {
                warn!(user_id, "Failed to load my bids: {}", e);
                self.feed.set_error(Some(format!("failed to load my bids: {e}")));
                return;
            }
        };

        // superseded while the request was in flight
        if self.feed.view().data.user_id != Some(user_id) {
            return;
        }

        let now = Utc::now();
        let mut seen = HashSet::new();
        let entries: Vec<MyBidUpdate> = bids
            .iter()
            .filter(|bid| seen.insert(bid.product_id))
            .map(|bid| MyBidUpdate::from_summary(bid, now))
            .collect();

        let mut topic_list = vec![topics::USER_NOTIFICATIONS.to_string()];
        topic_list.extend(entries.iter().map(|e| topics::bid(e.product_id)));

        info!(user_id, products = entries.len(), "Tracking my bids");
        self.feed.update(|state| {
            state.entries = entries;
            true
        });
        self.feed.subscribe(&topic_list);
    }

    /// Starts following a product the user just bid on, without a REST round trip.
    pub fn track_product(&self, product_id: i64, product_name: Option<String>) {
        if self.feed.view().data.user_id.is_none() {
            return;
        }
        let now = Utc::now();
        self.feed.update(|state| {
            upsert(
                &mut state.entries,
                product_id,
                |e| e.product_id,
                || MyBidUpdate::new(product_id, now),
                |entry| {
                    if product_name.is_some() {
                        entry.product_name = product_name;
                    }
                },
            );
            true
        });
        self.feed.add_topic(&topics::bid(product_id));
    }

    pub fn topics(&self) -> Vec<String> {
        self.feed.topics()
    }

    pub fn view(&self) -> FeedView<MyBidsState> {
        self.feed.view()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView<MyBidsState>> {
        self.feed.watch()
    }

    pub fn close(&self) {
        self.feed.unsubscribe();
    }
}

/// file: src/feeds/my_auctions.rs
/// description: Seller-side feed of the seller's own auctions
use super::upsert;
use crate::channel::RealtimeChannel;
use crate::feed::{FeedReducer, FeedView, Outcome, TopicFeed};
use crate::notifier::SilentNotifier;
use crate::protocol::{InboundMessage, Payload, topics};
use crate::status::AuctionStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyAuctionUpdate {
    pub product_id: i64,
    pub product_name: Option<String>,
    pub current_price: Option<i64>,
    pub bid_count: Option<u64>,
    pub last_bidder: Option<String>,
    pub winner: Option<String>,
    pub status: AuctionStatus,
    pub updated_at: DateTime<Utc>,
}

impl MyAuctionUpdate {
    fn new(product_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            product_id,
            product_name: None,
            current_price: None,
            bid_count: None,
            last_bidder: None,
            winner: None,
            status: AuctionStatus::Bidding,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MyAuctionsState {
    pub seller_id: Option<i64>,
    pub entries: Vec<MyAuctionUpdate>,
}

#[derive(Debug, Clone, Default)]
pub struct MyAuctionsReducer;

impl FeedReducer for MyAuctionsReducer {
    type State = MyAuctionsState;
    const NAME: &'static str = "my-auctions";

    fn reduce(
        &self,
        state: &mut MyAuctionsState,
        _topic: &str,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome {
        let Some(product_id) = message.product_id() else {
            return Outcome::unchanged();
        };

        match &message.payload {
            Payload::Bid(bid) => {
                upsert(
                    &mut state.entries,
                    product_id,
                    |e| e.product_id,
                    || MyAuctionUpdate::new(product_id, now),
                    |entry| {
                        entry.current_price = Some(bid.current_price);
                        if bid.bid_count.is_some() {
                            entry.bid_count = bid.bid_count;
                        }
                        entry.last_bidder = bid.last_bidder.clone();
                        if bid.product_name.is_some() {
                            entry.product_name = bid.product_name.clone();
                        }
                        entry.updated_at = now;
                    },
                );
                Outcome::changed()
            }
            Payload::Status(status) => {
                upsert(
                    &mut state.entries,
                    product_id,
                    |e| e.product_id,
                    || MyAuctionUpdate::new(product_id, now),
                    |entry| {
                        entry.status = AuctionStatus::resolve(
                            status.status.as_deref(),
                            &message.content,
                            entry.status,
                        );
                        if status.final_price.is_some() {
                            entry.current_price = status.final_price;
                        }
                        if status.winner.is_some() {
                            entry.winner = status.winner.clone();
                        }
                        if status.product_name.is_some() {
                            entry.product_name = status.product_name.clone();
                        }
                        entry.updated_at = now;
                    },
                );
                Outcome::changed()
            }
            _ => Outcome::unchanged(),
        }
    }
}

pub struct MyAuctionsFeed {
    feed: TopicFeed<MyAuctionsReducer>,
}

impl MyAuctionsFeed {
    pub fn new(channel: RealtimeChannel) -> Self {
        Self {
            feed: TopicFeed::new(channel, MyAuctionsReducer, Arc::new(SilentNotifier)),
        }
    }

    /// Follows `seller_id`'s queue. The same id again is a no-op; `None` tears down.
    pub fn set_seller(&self, seller_id: Option<i64>) {
        let current = self.feed.view().data.seller_id;
        if current == seller_id && (seller_id.is_none() || self.feed.is_subscribed()) {
            return;
        }

        self.feed.unsubscribe();
        match seller_id {
            Some(id) => {
                self.feed.reset(MyAuctionsState {
                    seller_id: Some(id),
                    entries: Vec::new(),
                });
                self.feed.subscribe(&[topics::my_auctions(id)]);
            }
            None => {
                self.feed.reset(MyAuctionsState::default());
                self.feed.set_error(Some("user id is required".to_string()));
            }
        }
    }

    pub fn view(&self) -> FeedView<MyAuctionsState> {
        self.feed.view()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView<MyAuctionsState>> {
        self.feed.watch()
    }

    pub fn close(&self) {
        self.feed.unsubscribe();
    }
}

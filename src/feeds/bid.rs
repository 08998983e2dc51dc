/// file: src/feeds/bid.rs
/// description: Per-product bid feed with status inference and countdown
use crate::channel::RealtimeChannel;
use crate::config::FeedConfig;
use crate::countdown::{AuctionTimerData, Countdown};
use crate::feed::{FeedReducer, FeedView, Outcome, TopicFeed};
use crate::notifier::SilentNotifier;
use crate::protocol::{InboundMessage, Payload, parse_server_time, topics};
use crate::status::AuctionStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidUpdate {
    pub product_id: i64,
    pub current_price: i64,
    pub bid_count: u64,
    pub last_bidder: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BidFeedState {
    pub product_id: Option<i64>,
    pub bid: Option<BidUpdate>,
    pub status: AuctionStatus,
    pub countdown: Option<Countdown>,
}

impl BidFeedState {
    pub fn for_product(product_id: i64) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn timer(&self) -> Option<&AuctionTimerData> {
        self.countdown.as_ref().map(Countdown::data)
    }

    fn set_status(&mut self, status: AuctionStatus) -> bool {
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.set_status(status);
        }
        std::mem::replace(&mut self.status, status) != status
    }
}

#[derive(Debug, Clone)]
pub struct BidReducer {
    tick: Duration,
}

impl BidReducer {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }
}

impl FeedReducer for BidReducer {
    type State = BidFeedState;
    const NAME: &'static str = "bid";

    fn reduce(
        &self,
        state: &mut BidFeedState,
        topic: &str,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome {
        let Some(product_id) = state.product_id else {
            return Outcome::unchanged();
        };
        // late frame from a previous product
        if topics::product_id_of(topic) != Some(product_id) {
            return Outcome::unchanged();
        }

        match &message.payload {
            Payload::Bid(bid) if bid.product_id == product_id => {
                let previous_count = state.bid.as_ref().map_or(0, |b| b.bid_count);
                state.bid = Some(BidUpdate {
                    product_id,
                    current_price: bid.current_price,
                    bid_count: bid.bid_count.unwrap_or(previous_count),
                    last_bidder: bid.last_bidder.clone(),
                    timestamp: bid
                        .timestamp
                        .as_deref()
                        .and_then(parse_server_time)
                        .unwrap_or_else(|| message.timestamp_or(now)),
                });
                Outcome::changed()
            }
            Payload::Status(status) => {
                let resolved =
                    AuctionStatus::resolve(status.status.as_deref(), &message.content, state.status);
                let mut changed = state.set_status(resolved);
                if let (Some(price), Some(bid)) = (status.final_price, state.bid.as_mut())
                    && bid.current_price != price
                {
                    bid.current_price = price;
                    changed = true;
                }
                Outcome::when(changed)
            }
            Payload::Timer(timer) if timer.product_id == product_id => {
                let countdown = state
                    .countdown
                    .get_or_insert_with(|| Countdown::new(product_id, now));
                countdown.reconcile(timer, now);
                let timer_status = countdown.data().status;
                if timer.status().is_some() || (timer_status.is_closed() && !state.status.is_closed()) {
                    state.status = timer_status;
                }
                Outcome::changed()
            }
            _ => Outcome::unchanged(),
        }
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(self.tick)
    }

    fn tick(&self, state: &mut BidFeedState, now: DateTime<Utc>) -> bool {
        let Some(countdown) = state.countdown.as_mut() else {
            return false;
        };
        let mut changed = countdown.tick(now);
        if countdown.data().is_ended && !state.status.is_closed() {
            state.status = AuctionStatus::Ended;
            changed = true;
        }
        changed
    }
}

/// Live price, status and remaining time of one product.
pub struct BidFeed {
    feed: TopicFeed<BidReducer>,
}

impl BidFeed {
    pub fn new(channel: RealtimeChannel, config: &FeedConfig) -> Self {
        Self {
            feed: TopicFeed::new(
                channel,
                BidReducer::new(config.countdown_tick),
                Arc::new(SilentNotifier),
            ),
        }
    }

    pub fn open(channel: RealtimeChannel, product_id: Option<i64>, config: &FeedConfig) -> Self {
        let feed = Self::new(channel, config);
        feed.set_product(product_id);
        feed
    }

    /// Follows `product_id`. The same id again is a no-op; `None` tears down.
    pub fn set_product(&self, product_id: Option<i64>) {
        let current = self.feed.view().data.product_id;
        if current == product_id && self.feed.is_subscribed() {
            return;
        }

        self.feed.unsubscribe();
        match product_id {
            Some(id) => {
                debug!(product_id = id, "Following product");
                self.feed.reset(BidFeedState::for_product(id));
                self.feed
                    .subscribe(&[topics::bid(id), topics::auction_timer(id)]);
            }
            None => {
                self.feed.reset(BidFeedState::default());
                self.feed.set_error(Some("product id is required".to_string()));
            }
        }
    }

    /// Starts the local countdown from an authoritative end time.
    pub fn seed_end_time(&self, end_time: DateTime<Utc>) -> bool {
        let now = Utc::now();
        self.feed.update(|state| {
            let Some(product_id) = state.product_id else {
                return false;
            };
            state
                .countdown
                .get_or_insert_with(|| Countdown::new(product_id, now))
                .seed_end_time(end_time, now);
            true
        })
    }

    pub fn view(&self) -> FeedView<BidFeedState> {
        self.feed.view()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView<BidFeedState>> {
        self.feed.watch()
    }

    pub fn close(&self) {
        self.feed.unsubscribe();
    }
}

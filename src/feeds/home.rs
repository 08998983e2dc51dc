/// file: src/feeds/home.rs
/// description: Home page aggregate of popular products, recent bids, ending-soon list and counters
use crate::channel::RealtimeChannel;
use crate::config::FeedConfig;
use crate::feed::{FeedReducer, FeedView, Outcome, TopicFeed};
use crate::notifier::SilentNotifier;
use crate::protocol::{AuctionStats, InboundMessage, MessageKind, Payload, ProductSummary, RecentBid, topics};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HomeRealtimeData {
    pub popular_products: Vec<ProductSummary>,
    pub recent_bids: Vec<RecentBid>,
    pub ending_soon: Vec<ProductSummary>,
    pub stats: AuctionStats,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct HomeReducer {
    recent_bids_cap: usize,
}

impl HomeReducer {
    pub fn new(recent_bids_cap: usize) -> Self {
        Self { recent_bids_cap }
    }
}

impl FeedReducer for HomeReducer {
    type State = HomeRealtimeData;
    const NAME: &'static str = "home";

    fn reduce(
        &self,
        state: &mut HomeRealtimeData,
        _topic: &str,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome {
        match (&message.kind, &message.payload) {
            (MessageKind::HomeUpdate, Payload::Home(snapshot)) => {
                let mut recent_bids = snapshot.recent_bids.clone().unwrap_or_default();
                recent_bids.truncate(self.recent_bids_cap);
                *state = HomeRealtimeData {
                    popular_products: snapshot.popular_products.clone().unwrap_or_default(),
                    recent_bids,
                    ending_soon: snapshot.ending_soon.clone().unwrap_or_default(),
                    stats: snapshot.stats.clone().unwrap_or_default(),
                    last_update: Some(now),
                };
            }
            (MessageKind::PopularProducts, Payload::Products(products)) => {
                state.popular_products = products.clone();
            }
            (MessageKind::EndingSoon, Payload::Products(products)) => {
                state.ending_soon = products.clone();
            }
            (MessageKind::RecentBids, Payload::RecentBids(bids)) => {
                let mut merged = bids.clone();
                merged.append(&mut state.recent_bids);
                merged.truncate(self.recent_bids_cap);
                state.recent_bids = merged;
            }
            (MessageKind::AuctionStats, Payload::Stats(stats)) => {
                state.stats.merge(stats);
            }
            _ => return Outcome::unchanged(),
        }
        state.last_update = Some(now);
        Outcome::changed()
    }
}

pub struct HomeFeed {
    feed: TopicFeed<HomeReducer>,
}

impl HomeFeed {
    pub fn new(channel: RealtimeChannel, config: &FeedConfig) -> Self {
        Self {
            feed: TopicFeed::new(
                channel,
                HomeReducer::new(config.recent_bids_cap),
                Arc::new(SilentNotifier),
            ),
        }
    }

    pub fn open(&self) {
        self.feed.add_topic(topics::HOME_UPDATES);
    }

    pub fn view(&self) -> FeedView<HomeRealtimeData> {
        self.feed.view()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView<HomeRealtimeData>> {
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

    fn reduce(state: &mut HomeRealtimeData, json: &str) -> Outcome {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let message = InboundMessage::parse(json).unwrap();
        HomeReducer::new(10).reduce(state, topics::HOME_UPDATES, &message, now)
    }

    #[test]
    fn test_recent_bids_prepend_capped_at_ten() {
        let mut state = HomeRealtimeData::default();
        for batch in 0..4 {
            let bids: Vec<String> = (0..3)
                .map(|i| format!(r#"{{"productId":{},"bidAmount":{}}}"#, batch * 3 + i, 100 + i))
                .collect();
            reduce(
                &mut state,
                &format!(r#"{{"type":"RECENT_BIDS","content":"","data":[{}]}}"#, bids.join(",")),
            );
        }

        assert_eq!(state.recent_bids.len(), 10);
        assert_eq!(state.recent_bids[0].product_id, 9);
        assert_eq!(state.recent_bids[9].product_id, 0);
    }

    #[test]
    fn test_home_update_replaces_everything() {
        let mut state = HomeRealtimeData::default();
        reduce(&mut state, r#"{"type":"POPULAR_PRODUCTS","content":"","data":[{"productId":1}]}"#);
        reduce(&mut state, r#"{"type":"AUCTION_STATS","content":"","data":{"activeAuctions":3}}"#);

        reduce(
            &mut state,
            r#"{"type":"HOME_UPDATE","content":"","data":{"endingSoon":[{"productId":5}],"stats":{"totalBids":40}}}"#,
        );

        assert!(state.popular_products.is_empty());
        assert_eq!(state.ending_soon.len(), 1);
        assert_eq!(state.stats.active_auctions, None);
        assert_eq!(state.stats.total_bids, Some(40));
    }

    #[test]
    fn test_stats_merge_and_list_replace() {
        let mut state = HomeRealtimeData::default();
        reduce(&mut state, r#"{"type":"AUCTION_STATS","content":"","data":{"activeAuctions":3,"totalBids":10}}"#);
        reduce(&mut state, r#"{"type":"AUCTION_STATS","content":"","data":{"totalBids":12}}"#);
        reduce(&mut state, r#"{"type":"ENDING_SOON","content":"","data":{"products":[{"productId":1},{"productId":2}]}}"#);
        reduce(&mut state, r#"{"type":"ENDING_SOON","content":"","data":[{"productId":3}]}"#);

        assert_eq!(state.stats.active_auctions, Some(3));
        assert_eq!(state.stats.total_bids, Some(12));
        assert_eq!(state.ending_soon.len(), 1);
        assert_eq!(state.ending_soon[0].product_id, 3);
    }

    #[test]
    fn test_unrelated_kinds_ignored() {
        let mut state = HomeRealtimeData::default();
        let outcome = reduce(&mut state, r#"{"type":"CHAT","content":"hi"}"#);
        assert!(!outcome.changed);
        assert!(state.last_update.is_none());
    }
}

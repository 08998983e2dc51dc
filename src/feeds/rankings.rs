/// file: src/feeds/rankings.rs
/// description: Overall or per-category product ranking feed
use super::upsert;
use crate::channel::RealtimeChannel;
use crate::feed::{FeedReducer, FeedView, Outcome, TopicFeed};
use crate::notifier::SilentNotifier;
use crate::protocol::{InboundMessage, MessageKind, Payload, RankingEntry, topics};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankingScope {
    Overall,
    Category(String),
}

impl RankingScope {
    pub fn from_arg(raw: &str) -> Self {
        match raw.trim() {
            "" | "overall" | "all" => RankingScope::Overall,
            category => RankingScope::Category(category.to_string()),
        }
    }

    pub fn topic(&self) -> String {
        match self {
            RankingScope::Overall => topics::RANKINGS_OVERALL.to_string(),
            RankingScope::Category(category) => topics::rankings(category),
        }
    }
}

impl fmt::Display for RankingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingScope::Overall => f.write_str("overall"),
            RankingScope::Category(category) => f.write_str(category),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingData {
    pub product_id: i64,
    pub rank: Option<u64>,
    pub product_name: Option<String>,
    pub current_price: Option<i64>,
    pub bid_count: Option<u64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub is_new_bid: bool,
    pub updated_at: DateTime<Utc>,
}

impl RankingData {
    fn from_entry(entry: &RankingEntry, now: DateTime<Utc>) -> Self {
        Self {
            product_id: entry.product_id,
            rank: entry.rank,
            product_name: entry.product_name.clone(),
            current_price: entry.current_price,
            bid_count: entry.bid_count,
            category: entry.category.clone(),
            image_url: entry.image_url.clone(),
            is_new_bid: false,
            updated_at: now,
        }
    }

    fn merge(&mut self, entry: &RankingEntry, now: DateTime<Utc>) {
        if entry.rank.is_some() {
            self.rank = entry.rank;
        }
        if entry.product_name.is_some() {
            self.product_name = entry.product_name.clone();
        }
        if entry.current_price.is_some() {
            self.current_price = entry.current_price;
        }
        if entry.bid_count.is_some() {
            self.bid_count = entry.bid_count;
        }
        if entry.category.is_some() {
            self.category = entry.category.clone();
        }
        if entry.image_url.is_some() {
            self.image_url = entry.image_url.clone();
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingsState {
    pub scope: Option<RankingScope>,
    pub entries: Vec<RankingData>,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct RankingsReducer;

impl FeedReducer for RankingsReducer {
    type State = RankingsState;
    const NAME: &'static str = "rankings";

    fn reduce(
        &self,
        state: &mut RankingsState,
        _topic: &str,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome {
        match (&message.kind, &message.payload) {
            (MessageKind::RankingUpdate | MessageKind::RankingRefresh, Payload::Rankings(snapshot)) => {
                state.entries = snapshot
                    .entries
                    .iter()
                    .map(|entry| RankingData::from_entry(entry, now))
                    .collect();
                for (index, entry) in state.entries.iter_mut().enumerate() {
                    entry.rank.get_or_insert(index as u64 + 1);
                }
                state.last_refresh = Some(now);
                Outcome::changed()
            }
            (MessageKind::NewBidRanking, Payload::RankingEntry(entry)) => {
                upsert(
                    &mut state.entries,
                    entry.product_id,
                    |e| e.product_id,
                    || RankingData::from_entry(entry, now),
                    |data| {
                        data.merge(entry, now);
                        data.is_new_bid = true;
                    },
                );
                // stable, so unranked entries keep their relative order at the end
                state.entries.sort_by_key(|e| e.rank.unwrap_or(u64::MAX));
                Outcome::changed()
            }
            _ => Outcome::unchanged(),
        }
    }
}

pub struct RankingsFeed {
    feed: TopicFeed<RankingsReducer>,
}

impl RankingsFeed {
    pub fn new(channel: RealtimeChannel) -> Self {
        Self {
            feed: TopicFeed::new(channel, RankingsReducer, Arc::new(SilentNotifier)),
        }
    }

    /// Switches the ranking board. `None` tears down.
    pub fn set_scope(&self, scope: Option<RankingScope>) {
        let current = self.feed.view().data.scope;
        if current == scope && (scope.is_none() || self.feed.is_subscribed()) {
            return;
        }

        self.feed.unsubscribe();
        let topic = scope.as_ref().map(RankingScope::topic);
        self.feed.reset(RankingsState {
            scope,
            ..RankingsState::default()
        });
        if let Some(topic) = topic {
            self.feed.subscribe(&[topic]);
        }
    }

    pub fn view(&self) -> FeedView<RankingsState> {
        self.feed.view()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView<RankingsState>> {
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

    fn reduce(state: &mut RankingsState, json: &str) -> Outcome {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let message = InboundMessage::parse(json).unwrap();
        RankingsReducer.reduce(state, topics::RANKINGS_OVERALL, &message, now)
    }

    #[test]
    fn test_scope_topics() {
        assert_eq!(RankingScope::from_arg("overall").topic(), "/topic/rankings/overall");
        assert_eq!(RankingScope::from_arg("art").topic(), "/topic/rankings/art");
    }

    #[test]
    fn test_update_replaces_full_list() {
        let mut state = RankingsState::default();
        reduce(&mut state, r#"{"type":"RANKING_UPDATE","content":"","data":[{"productId":1},{"productId":2},{"productId":3}]}"#);
        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.entries[2].rank, Some(3));

        reduce(&mut state, r#"{"type":"RANKING_REFRESH","content":"","data":{"rankings":[{"productId":9,"rank":1}]}}"#);
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].product_id, 9);
        assert!(state.last_refresh.is_some());
    }

    #[test]
    fn test_new_bid_ranking_upserts_and_flags() {
        let mut state = RankingsState::default();
        reduce(
            &mut state,
            r#"{"type":"RANKING_UPDATE","content":"","data":[{"productId":1,"rank":1,"currentPrice":500},{"productId":2,"rank":2,"currentPrice":400}]}"#,
        );

        reduce(
            &mut state,
            r#"{"type":"NEW_BID_RANKING","content":"","data":{"productId":2,"rank":1,"currentPrice":600}}"#,
        );
        assert_eq!(state.entries.len(), 2);
        let bumped = state.entries.iter().find(|e| e.product_id == 2).unwrap();
        assert!(bumped.is_new_bid);
        assert_eq!(bumped.current_price, Some(600));

        reduce(
            &mut state,
            r#"{"type":"NEW_BID_RANKING","content":"","data":{"productId":3,"rank":3}}"#,
        );
        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.entries[2].product_id, 3);
        assert!(state.entries[2].is_new_bid);
    }
}

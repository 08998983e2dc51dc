/// file: src/formatter.rs
/// description: Renders feed views as table rows, JSON lines or minimal text
use crate::countdown::AuctionTimerData;
use crate::feeds::bid::BidFeedState;
use crate::feeds::home::HomeRealtimeData;
use crate::feeds::my_auctions::MyAuctionsState;
use crate::feeds::my_bids::MyBidsState;
use crate::feeds::notifications::NotificationsState;
use crate::feeds::rankings::RankingsState;
use crate::status::AuctionStatus;
use chrono::{DateTime, Local, Utc};
use serde_json::json;

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const RED: &'static str = "\x1b[31m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Table,
        }
    }
}

fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn price(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v}원"))
}

/// One formatter per terminal. Every `format_*` returns the rendered text,
/// `None` when the view has nothing to show.
pub struct ViewFormatter {
    format: OutputFormat,
    colored: bool,
}

impl ViewFormatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}", color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    fn tag(&self, color: &str, label: &str) -> String {
        if self.colored {
            format!("{}{}[{}]{}", Colors::BOLD, color, label, Colors::RESET)
        } else {
            format!("[{label}]")
        }
    }

    fn status_color(status: AuctionStatus) -> &'static str {
        match status {
            AuctionStatus::Bidding => Colors::BRIGHT_GREEN,
            AuctionStatus::EndingSoon => Colors::BRIGHT_YELLOW,
            AuctionStatus::Successful => Colors::BRIGHT_CYAN,
            AuctionStatus::Failed => Colors::BRIGHT_RED,
            AuctionStatus::BeforeStart | AuctionStatus::Ended => Colors::WHITE,
        }
    }

    fn timer_text(&self, timer: &AuctionTimerData) -> String {
        if timer.is_ending_soon && !timer.is_ended {
            self.paint(Colors::BRIGHT_RED, &timer.time_left)
        } else {
            timer.time_left.clone()
        }
    }

    pub fn format_bid(&self, state: &BidFeedState) -> Option<String> {
        let product_id = state.product_id?;
        let timer = state.timer();

        match self.format {
            OutputFormat::Json => {
                let value = json!({
                    "feed": "bid",
                    "productId": product_id,
                    "bid": state.bid,
                    "status": state.status.code(),
                    "timer": timer,
                });
                Some(value.to_string())
            }
            OutputFormat::Minimal => Some(format!(
                "#{} {} {}",
                product_id,
                price(state.bid.as_ref().map(|b| b.current_price)),
                timer.map(|t| t.time_left.as_str()).unwrap_or_default()
            )),
            OutputFormat::Table => {
                let bid = state.bid.as_ref();
                Some(format!(
                    "{} #{:<6} {:>14} │ {:>4} bids │ {:<10} │ {:<16} │ {}",
                    self.tag(Colors::BRIGHT_BLUE, "BID"),
                    product_id,
                    price(bid.map(|b| b.current_price)),
                    bid.map_or(0, |b| b.bid_count),
                    bid.and_then(|b| b.last_bidder.clone()).unwrap_or_else(|| "-".into()),
                    self.paint(Self::status_color(state.status), state.status.label()),
                    timer.map(|t| self.timer_text(t)).unwrap_or_default(),
                ))
            }
        }
    }

    pub fn format_my_bids(&self, state: &MyBidsState) -> Option<String> {
        if state.entries.is_empty() {
            return None;
        }

        match self.format {
            OutputFormat::Json => Some(
                json!({
                    "feed": "my-bids",
                    "userId": state.user_id,
                    "entries": state.entries,
                })
                .to_string(),
            ),
            OutputFormat::Minimal => Some(
                state
                    .entries
                    .iter()
                    .map(|e| {
                        format!(
                            "#{} {}{}",
                            e.product_id,
                            price(e.current_price),
                            if e.is_outbid { " OUTBID" } else { "" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            OutputFormat::Table => {
                let mut out = self.tag(Colors::BRIGHT_MAGENTA, "MY BIDS");
                for entry in &state.entries {
                    let flag = if entry.is_outbid {
                        self.paint(Colors::BRIGHT_RED, "상위 입찰 발생")
                    } else {
                        String::new()
                    };
                    out.push_str(&format!(
                        "\n  #{:<6} {:<20} {:>14} (내 입찰 {}) {:<8} {}",
                        entry.product_id,
                        entry.product_name.as_deref().unwrap_or("-"),
                        price(entry.current_price),
                        price(entry.my_bid_amount),
                        self.paint(Self::status_color(entry.status), entry.status.label()),
                        flag
                    ));
                }
                Some(out)
            }
        }
    }

    pub fn format_my_auctions(&self, state: &MyAuctionsState) -> Option<String> {
        if state.entries.is_empty() {
            return None;
        }

        match self.format {
            OutputFormat::Json => Some(
                json!({
                    "feed": "my-auctions",
                    "sellerId": state.seller_id,
                    "entries": state.entries,
                })
                .to_string(),
            ),
            OutputFormat::Minimal => Some(
                state
                    .entries
                    .iter()
                    .map(|e| format!("#{} {} {}", e.product_id, price(e.current_price), e.status.code()))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            OutputFormat::Table => {
                let mut out = self.tag(Colors::BRIGHT_MAGENTA, "MY AUCTIONS");
                for entry in &state.entries {
                    out.push_str(&format!(
                        "\n  #{:<6} {:<20} {:>14} │ {:>4} bids │ {:<8} │ {}",
                        entry.product_id,
                        entry.product_name.as_deref().unwrap_or("-"),
                        price(entry.current_price),
                        entry.bid_count.unwrap_or(0),
                        self.paint(Self::status_color(entry.status), entry.status.label()),
                        entry.winner.as_deref().or(entry.last_bidder.as_deref()).unwrap_or("-"),
                    ));
                }
                Some(out)
            }
        }
    }

    /// Renders only the newest entry plus the unread total; the full inbox is in JSON mode.
    pub fn format_notifications(&self, state: &NotificationsState) -> Option<String> {
        let newest = state.entries.first()?;

        match self.format {
            OutputFormat::Json => Some(
                json!({
                    "feed": "notifications",
                    "unread": state.unread_count(),
                    "entries": state.entries,
                    "toasts": state.toasts,
                })
                .to_string(),
            ),
            OutputFormat::Minimal => Some(format!("{}: {}", newest.title, newest.message)),
            OutputFormat::Table => Some(format!(
                "{} {} {} {} {}",
                self.tag(Colors::BRIGHT_YELLOW, "NOTICE"),
                local_time(newest.received_at),
                self.paint(Colors::BOLD, &newest.title),
                newest.message,
                self.paint(Colors::GRAY, &format!("({} unread)", state.unread_count())),
            )),
        }
    }

    pub fn format_home(&self, data: &HomeRealtimeData) -> Option<String> {
        let updated = data.last_update?;

        match self.format {
            OutputFormat::Json => Some(
                json!({
                    "feed": "home",
                    "popularProducts": data.popular_products,
                    "recentBids": data.recent_bids,
                    "endingSoon": data.ending_soon,
                    "stats": data.stats,
                    "lastUpdate": updated,
                })
                .to_string(),
            ),
            OutputFormat::Minimal => Some(format!(
                "home popular={} recent={} ending={}",
                data.popular_products.len(),
                data.recent_bids.len(),
                data.ending_soon.len()
            )),
            OutputFormat::Table => {
                let mut out = format!(
                    "{} {} │ 인기 {} │ 최근 입찰 {} │ 마감 임박 {}",
                    self.tag(Colors::BRIGHT_CYAN, "HOME"),
                    local_time(updated),
                    data.popular_products.len(),
                    data.recent_bids.len(),
                    data.ending_soon.len()
                );
                if let Some(active) = data.stats.active_auctions {
                    out.push_str(&format!(" │ 진행 중 {active}"));
                }
                if let Some(bid) = data.recent_bids.first() {
                    out.push_str(&format!(
                        "\n  latest: #{} {}",
                        bid.product_id,
                        price(Some(bid.bid_amount))
                    ));
                }
                Some(out)
            }
        }
    }

    pub fn format_rankings(&self, state: &RankingsState) -> Option<String> {
        let scope = state.scope.as_ref()?;
        if state.entries.is_empty() {
            return None;
        }

        match self.format {
            OutputFormat::Json => Some(
                json!({
                    "feed": "rankings",
                    "scope": scope.to_string(),
                    "entries": state.entries,
                })
                .to_string(),
            ),
            OutputFormat::Minimal => Some(
                state
                    .entries
                    .iter()
                    .map(|e| format!("{}. #{}", e.rank.unwrap_or(0), e.product_id))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            OutputFormat::Table => {
                let mut out = format!("{} {}", self.tag(Colors::BRIGHT_GREEN, "RANKINGS"), scope);
                for entry in state.entries.iter().take(10) {
                    let marker = if entry.is_new_bid {
                        self.paint(Colors::BRIGHT_YELLOW, "NEW")
                    } else {
                        String::new()
                    };
                    out.push_str(&format!(
                        "\n  {:>3}. #{:<6} {:<20} {:>14} {}",
                        entry.rank.unwrap_or(0),
                        entry.product_id,
                        entry.product_name.as_deref().unwrap_or("-"),
                        price(entry.current_price),
                        marker
                    ));
                }
                Some(out)
            }
        }
    }

    pub fn format_unread(&self, count: u64) -> String {
        match self.format {
            OutputFormat::Json => json!({ "feed": "unread", "count": count }).to_string(),
            OutputFormat::Minimal => format!("unread {count}"),
            OutputFormat::Table => format!("{} {}", self.tag(Colors::BRIGHT_YELLOW, "UNREAD"), count),
        }
    }

    pub fn format_feed_error(&self, feed: &str, message: &str) -> String {
        format!(
            "{} {}: {}",
            self.tag(Colors::BRIGHT_RED, "FEED ERROR"),
            feed,
            self.paint(Colors::RED, message)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countdown::Countdown;
    use crate::feeds::bid::BidUpdate;
    use crate::feeds::rankings::{RankingData, RankingScope};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn bid_state() -> BidFeedState {
        let mut countdown = Countdown::new(7, now());
        countdown.seed_end_time(now() + chrono::Duration::minutes(5), now());
        BidFeedState {
            product_id: Some(7),
            bid: Some(BidUpdate {
                product_id: 7,
                current_price: 15_000,
                bid_count: 3,
                last_bidder: Some("lee".into()),
                timestamp: now(),
            }),
            status: AuctionStatus::Bidding,
            countdown: Some(countdown),
        }
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("minimal"), OutputFormat::Minimal);
        assert_eq!(OutputFormat::from("anything"), OutputFormat::Table);
    }

    #[test]
    fn test_bid_table_row_without_colors() {
        let formatter = ViewFormatter::new(OutputFormat::Table, false);
        let row = formatter.format_bid(&bid_state()).unwrap();

        assert!(row.starts_with("[BID] #7"));
        assert!(row.contains("15000원"));
        assert!(row.contains("lee"));
        assert!(!row.contains("\x1b["));
    }

    #[test]
    fn test_bid_json_is_parseable() {
        let formatter = ViewFormatter::new(OutputFormat::Json, true);
        let line = formatter.format_bid(&bid_state()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["productId"], 7);
        assert_eq!(value["bid"]["currentPrice"], 15_000);
        assert_eq!(value["status"], "BIDDING");
        assert_eq!(value["timer"]["isEndingSoon"], true);
    }

    #[test]
    fn test_empty_views_render_nothing() {
        let formatter = ViewFormatter::new(OutputFormat::Table, false);
        assert!(formatter.format_bid(&BidFeedState::default()).is_none());
        assert!(formatter.format_my_bids(&MyBidsState::default()).is_none());
        assert!(formatter.format_home(&HomeRealtimeData::default()).is_none());
        assert!(formatter.format_notifications(&NotificationsState::default()).is_none());
    }

    #[test]
    fn test_rankings_minimal() {
        let formatter = ViewFormatter::new(OutputFormat::Minimal, false);
        let entry = |id, rank| RankingData {
            product_id: id,
            rank: Some(rank),
            product_name: None,
            current_price: None,
            bid_count: None,
            category: None,
            image_url: None,
            is_new_bid: false,
            updated_at: now(),
        };
        let state = RankingsState {
            scope: Some(RankingScope::Overall),
            entries: vec![entry(4, 1), entry(2, 2)],
            last_refresh: Some(now()),
        };

        assert_eq!(formatter.format_rankings(&state).unwrap(), "1. #4 2. #2");
    }
}

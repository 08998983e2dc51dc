/// file: src/protocol.rs
/// description: Topic paths, the inbound JSON envelope and one validated payload schema per message kind
use crate::error::{AuctionRealtimeError, Result};
use crate::status::AuctionStatus;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Offset applied to server timestamps that carry no zone (Asia/Seoul).
pub const SERVER_UTC_OFFSET_SECS: i32 = 9 * 3600;

pub mod topics {
    pub const HOME_UPDATES: &str = "/topic/home-updates";
    pub const RANKINGS_OVERALL: &str = "/topic/rankings/overall";
    pub const USER_NOTIFICATIONS: &str = "/user/queue/notifications";

    pub fn bid(product_id: i64) -> String {
        format!("/topic/bid/{product_id}")
    }

    pub fn auction_timer(product_id: i64) -> String {
        format!("/topic/auction-timer/{product_id}")
    }

    pub fn rankings(category: &str) -> String {
        format!("/topic/rankings/{category}")
    }

    pub fn my_auctions(user_id: i64) -> String {
        format!("/user/queue/my-auctions/{user_id}")
    }

    pub fn app(destination: &str) -> String {
        format!("/app/{}", destination.trim_start_matches('/'))
    }

    /// Product id of a per-product topic (`/topic/bid/{id}`, `/topic/auction-timer/{id}`).
    pub fn product_id_of(topic: &str) -> Option<i64> {
        let rest = topic
            .strip_prefix("/topic/bid/")
            .or_else(|| topic.strip_prefix("/topic/auction-timer/"))?;
        rest.parse().ok()
    }
}

// Ids and amounts arrive as numbers or numeric strings depending on the endpoint
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn to_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
            }
            _ => None,
        }
    }

    pub fn i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        to_i64(&value).ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {value}")))
    }

    pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(v) => to_i64(&v)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {v}"))),
        }
    }

    pub fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_i64(deserializer)?.map(|v| v.max(0) as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Chat,
    Bid,
    AuctionTimer,
    Notification,
    System,
    HomeUpdate,
    PopularProducts,
    RecentBids,
    EndingSoon,
    AuctionStats,
    BidUpdate,
    AuctionEnd,
    RankingUpdate,
    NewBidRanking,
    RankingRefresh,
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidPayload {
    #[serde(deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(alias = "price", alias = "bidAmount", deserialize_with = "lenient::i64")]
    pub current_price: i64,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub bid_count: Option<u64>,
    #[serde(default, alias = "bidderNickname", alias = "bidder")]
    pub last_bidder: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub bidder_id: Option<i64>,
    #[serde(default, alias = "productTitle")]
    pub product_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerPayload {
    #[serde(deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(default)]
    pub time_left: Option<String>,
    #[serde(default)]
    pub is_ending_soon: Option<bool>,
    #[serde(default)]
    pub is_ended: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "endTime")]
    pub auction_end_time: Option<String>,
}

impl TimerPayload {
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.auction_end_time.as_deref().and_then(parse_server_time)
    }

    pub fn status(&self) -> Option<AuctionStatus> {
        self.status.as_deref().and_then(AuctionStatus::from_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    BidSuccess,
    Outbid,
    AuctionWon,
    AuctionLost,
    AuctionEndingSoon,
    AuctionEnd,
    Other,
}

impl NotificationKind {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "BID_SUCCESS" | "BID_PLACED" | "BID_ACCEPTED" => NotificationKind::BidSuccess,
            "OUTBID" | "BID_OUTBID" | "OUT_BID" => NotificationKind::Outbid,
            "AUCTION_WON" | "AUCTION_WIN" | "WON" => NotificationKind::AuctionWon,
            "AUCTION_LOST" | "AUCTION_LOSE" | "LOST" => NotificationKind::AuctionLost,
            "AUCTION_ENDING_SOON" | "ENDING_SOON" => NotificationKind::AuctionEndingSoon,
            "AUCTION_END" | "AUCTION_ENDED" => NotificationKind::AuctionEnd,
            _ => NotificationKind::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(default, alias = "notificationId", deserialize_with = "lenient::opt_i64")]
    pub id: Option<i64>,
    #[serde(default, rename = "type", alias = "notificationType")]
    pub notification_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub product_id: Option<i64>,
    #[serde(default, alias = "productTitle")]
    pub product_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub bid_amount: Option<i64>,
    #[serde(default, alias = "price", deserialize_with = "lenient::opt_i64")]
    pub current_price: Option<i64>,
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationKind {
        self.notification_type
            .as_deref()
            .map(NotificationKind::from_code)
            .unwrap_or(NotificationKind::Other)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "currentPrice", deserialize_with = "lenient::opt_i64")]
    pub final_price: Option<i64>,
    #[serde(default, alias = "winnerNickname")]
    pub winner: Option<String>,
    #[serde(default, alias = "productTitle")]
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    #[serde(deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(default, alias = "productTitle", alias = "title", alias = "name")]
    pub product_name: Option<String>,
    #[serde(default, alias = "price", deserialize_with = "lenient::opt_i64")]
    pub current_price: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub bid_count: Option<u64>,
    #[serde(default)]
    pub auction_end_time: Option<String>,
    #[serde(default)]
    pub time_left: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentBid {
    #[serde(deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(default, alias = "productTitle")]
    pub product_name: Option<String>,
    #[serde(alias = "amount", alias = "price", alias = "currentPrice", deserialize_with = "lenient::i64")]
    pub bid_amount: i64,
    #[serde(default, alias = "bidderNickname", alias = "lastBidder")]
    pub bidder: Option<String>,
    #[serde(default, alias = "bidTime", alias = "createdAt")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionStats {
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub active_auctions: Option<u64>,
    #[serde(default, alias = "todayBids", deserialize_with = "lenient::opt_u64")]
    pub total_bids: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub ending_soon_count: Option<u64>,
    #[serde(default, alias = "activeUsers", deserialize_with = "lenient::opt_u64")]
    pub online_users: Option<u64>,
}

impl AuctionStats {
    /// Field-wise merge: present values in `update` win.
    pub fn merge(&mut self, update: &AuctionStats) {
        if update.active_auctions.is_some() {
            self.active_auctions = update.active_auctions;
        }
        if update.total_bids.is_some() {
            self.total_bids = update.total_bids;
        }
        if update.ending_soon_count.is_some() {
            self.ending_soon_count = update.ending_soon_count;
        }
        if update.online_users.is_some() {
            self.online_users = update.online_users;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeSnapshot {
    #[serde(default)]
    pub popular_products: Option<Vec<ProductSummary>>,
    #[serde(default)]
    pub recent_bids: Option<Vec<RecentBid>>,
    #[serde(default, alias = "endingSoonProducts")]
    pub ending_soon: Option<Vec<ProductSummary>>,
    #[serde(default, alias = "auctionStats")]
    pub stats: Option<AuctionStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    #[serde(deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub rank: Option<u64>,
    #[serde(default, alias = "productTitle", alias = "title")]
    pub product_name: Option<String>,
    #[serde(default, alias = "price", deserialize_with = "lenient::opt_i64")]
    pub current_price: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub bid_count: Option<u64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankingSnapshot {
    pub category: Option<String>,
    pub entries: Vec<RankingEntry>,
}

/// Lists show up bare, wrapped in an object, or as a lone item.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(
            alias = "products",
            alias = "bids",
            alias = "recentBids",
            alias = "rankings",
            alias = "endingSoon"
        )]
        items: Vec<T>,
        #[serde(default)]
        category: Option<String>,
    },
    Single(T),
}

impl<T> Listing<T> {
    fn into_parts(self) -> (Vec<T>, Option<String>) {
        match self {
            Listing::Bare(items) => (items, None),
            Listing::Wrapped { items, category } => (items, category),
            Listing::Single(item) => (vec![item], None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", content = "value", rename_all = "snake_case")]
pub enum Payload {
    None,
    Bid(BidPayload),
    Timer(TimerPayload),
    Notification(NotificationPayload),
    Status(StatusPayload),
    Home(HomeSnapshot),
    Products(Vec<ProductSummary>),
    RecentBids(Vec<RecentBid>),
    Stats(AuctionStats),
    Rankings(RankingSnapshot),
    RankingEntry(RankingEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub sender: Option<String>,
    pub content: String,
    pub payload: Payload,
    pub timestamp: Option<String>,
}

impl InboundMessage {
    /// Parses and validates a frame body in one pass. Any schema mismatch is
    /// reported as `InvalidMessage` so the dispatcher can drop the frame.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let payload = parse_payload(envelope.kind, envelope.data)?;

        Ok(InboundMessage {
            kind: envelope.kind,
            sender: envelope.sender,
            content: envelope.content.unwrap_or_default(),
            payload,
            timestamp: envelope.timestamp.and_then(|ts| match ts {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        })
    }

    /// Product the message is about, whichever payload carries it.
    pub fn product_id(&self) -> Option<i64> {
        match &self.payload {
            Payload::Bid(bid) => Some(bid.product_id),
            Payload::Timer(timer) => Some(timer.product_id),
            Payload::Notification(n) => n.product_id,
            Payload::Status(s) => s.product_id,
            Payload::RankingEntry(entry) => Some(entry.product_id),
            _ => None,
        }
    }

    /// Server timestamp if parseable, else `fallback`.
    pub fn timestamp_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(parse_server_time)
            .unwrap_or(fallback)
    }
}

fn parse_payload(kind: MessageKind, data: Option<Value>) -> Result<Payload> {
    let data = data.filter(|v| !v.is_null());

    let payload = match kind {
        MessageKind::Chat => Payload::None,
        MessageKind::Bid | MessageKind::BidUpdate => Payload::Bid(required(kind, data)?),
        MessageKind::AuctionTimer => Payload::Timer(required(kind, data)?),
        MessageKind::Notification => Payload::Notification(optional(data)?),
        MessageKind::System | MessageKind::AuctionEnd => Payload::Status(optional(data)?),
        MessageKind::HomeUpdate => Payload::Home(required(kind, data)?),
        MessageKind::PopularProducts | MessageKind::EndingSoon => {
            let listing: Listing<ProductSummary> = required(kind, data)?;
            Payload::Products(listing.into_parts().0)
        }
        MessageKind::RecentBids => {
            let listing: Listing<RecentBid> = required(kind, data)?;
            Payload::RecentBids(listing.into_parts().0)
        }
        MessageKind::AuctionStats => Payload::Stats(required(kind, data)?),
        MessageKind::RankingUpdate | MessageKind::RankingRefresh => {
            let listing: Listing<RankingEntry> = required(kind, data)?;
            let (entries, category) = listing.into_parts();
            Payload::Rankings(RankingSnapshot { category, entries })
        }
        MessageKind::NewBidRanking => Payload::RankingEntry(required(kind, data)?),
    };

    Ok(payload)
}

fn required<T: serde::de::DeserializeOwned>(kind: MessageKind, data: Option<Value>) -> Result<T> {
    let data = data.ok_or_else(|| {
        AuctionRealtimeError::InvalidMessage(format!("{kind:?} message without data"))
    })?;
    serde_json::from_value(data)
        .map_err(|e| AuctionRealtimeError::InvalidMessage(format!("{kind:?} payload: {e}")))
}

fn optional<T: serde::de::DeserializeOwned + Default>(data: Option<Value>) -> Result<T> {
    match data {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| AuctionRealtimeError::InvalidMessage(format!("payload: {e}"))),
    }
}

/// Parses RFC 3339, or a zone-less ISO-8601 local time read as KST.
pub fn parse_server_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }

    let offset = FixedOffset::east_opt(SERVER_UTC_OFFSET_SECS)?;
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

/// file: src/api.rs
/// description: The two REST calls the realtime layer depends on
use crate::auth::CredentialSource;
use crate::config::ApiConfig;
use crate::error::{AuctionRealtimeError, Result};
use crate::protocol::lenient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

pub const MY_BIDS_PATH: &str = "/api/bids/my";
pub const UNREAD_COUNT_PATH: &str = "/api/notifications/unread-count";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyBidSummary {
    #[serde(deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(default, alias = "productTitle", alias = "title")]
    pub product_name: Option<String>,
    #[serde(default, alias = "myBidAmount", alias = "amount", deserialize_with = "lenient::opt_i64")]
    pub bid_amount: Option<i64>,
    #[serde(default, alias = "price", deserialize_with = "lenient::opt_i64")]
    pub current_price: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub auction_end_time: Option<String>,
}

#[async_trait]
pub trait AuctionApi: Send + Sync {
    /// Products the current user has bid on.
    async fn my_bids(&self) -> Result<Vec<MyBidSummary>>;

    async fn unread_notification_count(&self) -> Result<u64>;
}

pub struct HttpAuctionApi {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialSource>,
}

impl HttpAuctionApi {
    pub fn new(config: &ApiConfig, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config.base_url.clone(), credentials))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: Url,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.base_url.join(path)?;
        let mut request = self.client.get(url.clone());
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuctionRealtimeError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AuctionApi for HttpAuctionApi {
    #[instrument(skip(self))]
    async fn my_bids(&self) -> Result<Vec<MyBidSummary>> {
        let body = self.get_json(MY_BIDS_PATH).await?;
        let bids = parse_my_bids(body)?;
        debug!(count = bids.len(), "Loaded my bids");
        Ok(bids)
    }

    #[instrument(skip(self))]
    async fn unread_notification_count(&self) -> Result<u64> {
        parse_unread_count(self.get_json(UNREAD_COUNT_PATH).await?)
    }
}

fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

/// Accepts a bare list, `{data: [...]}` or a paged `{content: [...]}`.
pub fn parse_my_bids(body: Value) -> Result<Vec<MyBidSummary>> {
    let list = match unwrap_data(body) {
        Value::Object(mut map) => ["content", "bids", "items"]
            .iter()
            .find_map(|key| map.remove(*key))
            .unwrap_or(Value::Array(Vec::new())),
        Value::Null => Value::Array(Vec::new()),
        other => other,
    };
    serde_json::from_value(list)
        .map_err(|e| AuctionRealtimeError::InvalidMessage(format!("my bids: {e}")))
}

/// Accepts a number, `{unreadCount}`, `{count}` or any of them under `data`.
pub fn parse_unread_count(body: Value) -> Result<u64> {
    let value = match unwrap_data(body) {
        Value::Object(map) => map
            .get("unreadCount")
            .or_else(|| map.get("count"))
            .cloned()
            .unwrap_or(Value::Null),
        other => other,
    };
    match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| AuctionRealtimeError::InvalidMessage(format!("unread count: {value}")))
}

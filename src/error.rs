use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuctionRealtimeError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Connection timeout")]
    Timeout,

    #[error("Channel is not connected")]
    NotConnected,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("STOMP frame error: {0}")]
    StompError(String),

    #[error("Server rejected the session: {message}")]
    ServerError { message: String },

    #[error("Subscription failed: {message}")]
    SubscriptionFailed { message: String },

    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("SSE stream error: {0}")]
    SseError(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}

pub type Result<T> = std::result::Result<T, AuctionRealtimeError>;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "auction-realtime",
    about = "realtime bid and notification client for the auction marketplace",
    version
)]
pub struct Args {
    /// STOMP-over-WebSocket endpoint URL
    #[arg(short, long, env = "AUCTION_WS_URL", default_value = "ws://localhost:8080/ws")]
    pub url: String,

    /// REST API base URL
    #[arg(long, env = "AUCTION_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// SSE endpoint for unread notification counts (defaults to the API's subscribe path)
    #[arg(long, env = "AUCTION_SSE_URL")]
    pub sse_url: Option<String>,

    /// Cookie header to read the accessToken from (e.g. "accessToken=...")
    #[arg(long, env = "AUCTION_COOKIE")]
    pub cookie: Option<String>,

    /// Product ids to follow (bid feed + countdown); repeatable
    #[arg(short, long = "product")]
    pub products: Vec<i64>,

    /// Logged-in user id, used by the my-bids and my-auctions feeds
    #[arg(long)]
    pub user_id: Option<i64>,

    /// Follow every product the logged-in user has bid on
    #[arg(long)]
    pub my_bids: bool,

    /// Follow the logged-in user's own auctions as a seller
    #[arg(long)]
    pub my_auctions: bool,

    /// Follow the private notification queue
    #[arg(long)]
    pub notifications: bool,

    /// Follow the home page aggregate feed
    #[arg(long)]
    pub home: bool,

    /// Follow a ranking feed: "overall" or a category name
    #[arg(long)]
    pub rankings: Option<String>,

    /// Open the SSE unread-count stream
    #[arg(long)]
    pub unread_count: bool,

    /// Treat desktop notification permission as granted
    #[arg(long)]
    pub desktop_notifications: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// Connection timeout in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// STOMP heart-beat offered to the server, in milliseconds (0 disables)
    #[arg(long, default_value = "10000")]
    pub heartbeat_ms: u64,

    /// Base reconnection delay in milliseconds
    #[arg(long, default_value = "1000")]
    pub reconnect_base_ms: u64,

    /// Reconnection delay cap in milliseconds
    #[arg(long, default_value = "30000")]
    pub reconnect_max_ms: u64,

    /// Reconnect retries scheduled before giving up
    #[arg(long, default_value = "5")]
    pub max_reconnects: u32,

    /// Randomize reconnection delays
    #[arg(long)]
    pub jitter: bool,

    /// Maximum notifications kept in the feed
    #[arg(long, default_value = "50")]
    pub notification_cap: usize,

    /// Maximum recent bids kept in the home feed
    #[arg(long, default_value = "10")]
    pub recent_bids_cap: usize,

    /// Seconds before a toast dismisses itself
    #[arg(long, default_value = "5")]
    pub toast_secs: u64,

    /// Health check interval in seconds
    #[arg(long, default_value = "30")]
    pub health_check_interval: u64,

    /// Output format: table, json, minimal
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - only view changes, no connection chatter
    #[arg(long)]
    pub quiet: bool,
}

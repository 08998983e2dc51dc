/// file: src/config.rs
/// description: Typed configuration sections built from CLI arguments
use crate::auth::CookieJar;
use crate::backoff::BackoffPolicy;
use crate::cli::Args;
use crate::feeds::rankings::RankingScope;
use anyhow::Result;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(10_000);
pub const SSE_SUBSCRIBE_PATH: &str = "/api/notifications/subscribe";

#[derive(Debug, Clone)]
pub struct Config {
    pub channel: ChannelConfig,
    pub sse: SseConfig,
    pub api: ApiConfig,
    pub feeds: FeedConfig,
    pub session: SessionConfig,
    pub metrics: MetricsConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: Url,
    pub connect_timeout: Duration,
    /// Heart-beat period offered in CONNECT; zero disables heart-beating.
    pub heartbeat: Duration,
    pub backoff: BackoffPolicy,
}

impl ChannelConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat: DEFAULT_HEARTBEAT,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SseConfig {
    pub url: Url,
    pub backoff: BackoffPolicy,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub notification_cap: usize,
    pub recent_bids_cap: usize,
    pub toast_ttl: Duration,
    pub countdown_tick: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            notification_cap: 50,
            recent_bids_cap: 10,
            toast_ttl: Duration::from_secs(5),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub cookies: CookieJar,
    pub products: Vec<i64>,
    pub user_id: Option<i64>,
    pub my_bids: bool,
    pub my_auctions: bool,
    pub notifications: bool,
    pub home: bool,
    pub rankings: Option<RankingScope>,
    pub unread_count: bool,
    pub desktop_notifications: bool,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub check_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub format: String,
    pub colors: bool,
    pub quiet: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let url = Url::parse(&args.url)?;
        let api_base = Url::parse(&args.api_url)?;
        let sse_url = match &args.sse_url {
            Some(raw) => Url::parse(raw)?,
            None => api_base.join(SSE_SUBSCRIBE_PATH)?,
        };

        let backoff = BackoffPolicy::new(
            Duration::from_millis(args.reconnect_base_ms),
            Duration::from_millis(args.reconnect_max_ms),
            args.max_reconnects,
        )
        .with_jitter(args.jitter);

        Ok(Config {
            channel: ChannelConfig {
                url,
                connect_timeout: Duration::from_secs(args.timeout),
                heartbeat: Duration::from_millis(args.heartbeat_ms),
                backoff,
            },
            sse: SseConfig {
                url: sse_url,
                backoff,
            },
            api: ApiConfig {
                base_url: api_base,
                timeout: Duration::from_secs(args.timeout),
            },
            feeds: FeedConfig {
                notification_cap: args.notification_cap,
                recent_bids_cap: args.recent_bids_cap,
                toast_ttl: Duration::from_secs(args.toast_secs),
                ..FeedConfig::default()
            },
            session: SessionConfig {
                cookies: args.cookie.as_deref().map(CookieJar::parse).unwrap_or_default(),
                products: args.products.clone(),
                user_id: args.user_id,
                my_bids: args.my_bids,
                my_auctions: args.my_auctions,
                notifications: args.notifications,
                home: args.home,
                rankings: args.rankings.as_deref().map(RankingScope::from_arg),
                unread_count: args.unread_count,
                desktop_notifications: args.desktop_notifications,
            },
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
            health: HealthConfig {
                check_interval: Duration::from_secs(args.health_check_interval),
            },
            logging: LoggingConfig {
                level: args.log_level.clone(),
                json: args.json_logs,
            },
            display: DisplayConfig {
                format: args.format.clone(),
                colors: !args.no_color,
                quiet: args.quiet,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialSource;
    use clap::Parser;

    #[test]
    fn test_defaults_from_args() {
        let args = Args::parse_from(["auction-realtime", "--url", "ws://localhost:8080/ws"]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.channel.backoff, BackoffPolicy::default());
        assert_eq!(config.channel.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.channel.heartbeat, DEFAULT_HEARTBEAT);
        assert_eq!(config.feeds.notification_cap, 50);
        assert_eq!(config.feeds.recent_bids_cap, 10);
        assert_eq!(config.feeds.toast_ttl, Duration::from_secs(5));
        assert_eq!(
            config.sse.url.as_str(),
            "http://localhost:8080/api/notifications/subscribe"
        );
    }

    #[test]
    fn test_session_selection() {
        let args = Args::parse_from([
            "auction-realtime",
            "--url",
            "ws://localhost:8080/ws",
            "--cookie",
            "accessToken=tok",
            "-p",
            "1",
            "-p",
            "2",
            "--rankings",
            "overall",
        ]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.session.products, vec![1, 2]);
        assert_eq!(config.session.rankings, Some(RankingScope::Overall));
        assert_eq!(config.session.cookies.bearer_token().as_deref(), Some("tok"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let args = Args::parse_from(["auction-realtime", "--url", "not a url"]);
        assert!(Config::from_args(&args).is_err());
    }
}

use anyhow::Result;
use auction_realtime::{
    api::{AuctionApi, HttpAuctionApi},
    auth::CredentialSource,
    channel::RealtimeChannel,
    cli::Args,
    config::Config,
    events::{self, ClientEvent, EventSender, create_event_channel},
    feed::FeedView,
    feeds::{BidFeed, HomeFeed, MyAuctionsFeed, MyBidsFeed, NotificationsFeed, RankingsFeed},
    formatter::{OutputFormat, ViewFormatter},
    monitoring::setup_metrics,
    notifier::{DesktopNotifier, EventNotifier, NotificationPermission},
    sse::UnreadCountChannel,
    tracing_setup::setup_tracing,
    ui::{UIController, UIOptions},
};
use clap::Parser;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

/// Prints a feed's view on every change, and raises its error once per transition.
fn spawn_view_printer<S, F>(
    feed: &'static str,
    mut rx: watch::Receiver<FeedView<S>>,
    events: EventSender,
    render: F,
) -> JoinHandle<()>
where
    S: Clone + Send + Sync + 'static,
    F: Fn(&S) -> Option<String> + Send + 'static,
{
    tokio::spawn(async move {
        let mut last_error: Option<String> = None;
        let mut last_text: Option<String> = None;
        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update().clone();
            if view.error != last_error {
                if let Some(message) = &view.error {
                    events::publish(
                        Some(&events),
                        ClientEvent::FeedError {
                            feed,
                            message: message.clone(),
                        },
                    );
                }
                last_error = view.error.clone();
            }
            let text = render(&view.data);
            if text.is_some() && text != last_text {
                if let Some(line) = &text {
                    println!("{line}");
                }
                last_text = text;
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_args(&args)?;

    setup_tracing(&config.logging)?;
    info!(
        "Starting auction realtime client v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    let (event_tx, event_rx) = create_event_channel();
    let mut ui = UIController::new(
        event_rx,
        OutputFormat::from(config.display.format.as_str()),
        UIOptions {
            colored: config.display.colors,
            quiet: config.display.quiet,
        },
    );
    let ui_task = tokio::spawn(async move { ui.run().await });
    events::publish(Some(&event_tx), ClientEvent::Starting);

    let formatter = Arc::new(ViewFormatter::new(
        OutputFormat::from(config.display.format.as_str()),
        config.display.colors,
    ));
    let credentials: Arc<dyn CredentialSource> = Arc::new(config.session.cookies.clone());
    let permission = if config.session.desktop_notifications {
        NotificationPermission::Granted
    } else {
        NotificationPermission::Default
    };
    let notifier: Arc<dyn DesktopNotifier> =
        Arc::new(EventNotifier::new(event_tx.clone(), permission));
    let api: Arc<dyn AuctionApi> = Arc::new(HttpAuctionApi::new(&config.api, credentials.clone())?);

    let channel = RealtimeChannel::websocket(
        config.channel.clone(),
        credentials.clone(),
        Some(event_tx.clone()),
    );
    if let Err(e) = channel.connect().await {
        // the channel keeps retrying on its own schedule
        warn!("Initial connection failed: {}", e);
    }

    let session = &config.session;
    let mut printers = Vec::new();

    let bid_feeds: Vec<BidFeed> = session
        .products
        .iter()
        .map(|&id| BidFeed::open(channel.clone(), Some(id), &config.feeds))
        .collect();
    for feed in &bid_feeds {
        let fmt = formatter.clone();
        printers.push(spawn_view_printer("bid", feed.watch(), event_tx.clone(), move |s| {
            fmt.format_bid(s)
        }));
    }

    let my_bids = if session.my_bids {
        let feed = MyBidsFeed::new(channel.clone(), api.clone(), notifier.clone());
        let fmt = formatter.clone();
        printers.push(spawn_view_printer("my-bids", feed.watch(), event_tx.clone(), move |s| {
            fmt.format_my_bids(s)
        }));
        feed.set_user(session.user_id).await;
        Some(feed)
    } else {
        None
    };

    let my_auctions = session.my_auctions.then(|| {
        let feed = MyAuctionsFeed::new(channel.clone());
        let fmt = formatter.clone();
        printers.push(spawn_view_printer("my-auctions", feed.watch(), event_tx.clone(), move |s| {
            fmt.format_my_auctions(s)
        }));
        feed.set_seller(session.user_id);
        feed
    });

    let notifications = session.notifications.then(|| {
        let feed = NotificationsFeed::new(channel.clone(), notifier.clone(), &config.feeds);
        let fmt = formatter.clone();
        printers.push(spawn_view_printer(
            "notifications",
            feed.watch(),
            event_tx.clone(),
            move |s| fmt.format_notifications(s),
        ));
        feed.open();
        feed
    });

    let home = session.home.then(|| {
        let feed = HomeFeed::new(channel.clone(), &config.feeds);
        let fmt = formatter.clone();
        printers.push(spawn_view_printer("home", feed.watch(), event_tx.clone(), move |s| {
            fmt.format_home(s)
        }));
        feed.open();
        feed
    });

    let rankings = session.rankings.clone().map(|scope| {
        let feed = RankingsFeed::new(channel.clone());
        let fmt = formatter.clone();
        printers.push(spawn_view_printer("rankings", feed.watch(), event_tx.clone(), move |s| {
            fmt.format_rankings(s)
        }));
        feed.set_scope(Some(scope));
        feed
    });

    let unread = if session.unread_count {
        let client = reqwest::Client::builder().build()?;
        Some(UnreadCountChannel::spawn(
            config.sse.clone(),
            client,
            credentials.clone(),
            Some(api.clone()),
            Some(event_tx.clone()),
        ))
    } else {
        None
    };

    info!("Client started. Press Ctrl+C to shutdown...");
    let mut health =
        tokio::time::interval(config.health.check_interval.max(Duration::from_secs(1)));
    health.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = health.tick() => {
                let status = channel.health();
                if status.is_healthy {
                    info!(health = %status.to_json(), "Health check");
                } else {
                    warn!(health = %status.to_json(), "Health check: channel not connected");
                }
            }
        }
    }

    for feed in &bid_feeds {
        feed.close();
    }
    if let Some(feed) = &my_bids {
        feed.close();
    }
    if let Some(feed) = &my_auctions {
        feed.close();
    }
    if let Some(feed) = &notifications {
        feed.close();
    }
    if let Some(feed) = &home {
        feed.close();
    }
    if let Some(feed) = &rankings {
        feed.close();
    }
    if let Some(sse) = &unread {
        sse.close();
    }
    channel.disconnect();

    for printer in printers {
        printer.abort();
    }
    events::publish(Some(&event_tx), ClientEvent::Stopping);
    drop(event_tx);
    match tokio::time::timeout(Duration::from_secs(2), ui_task).await {
        Ok(Err(e)) => error!("UI task failed: {}", e),
        Err(_) => warn!("UI did not drain its events in time"),
        Ok(Ok(())) => {}
    }

    info!("Client stopped successfully");
    Ok(())
}

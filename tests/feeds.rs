mod common;

use async_trait::async_trait;
use auction_realtime::api::{AuctionApi, MyBidSummary};
use auction_realtime::config::FeedConfig;
use auction_realtime::error::{AuctionRealtimeError, Result};
use auction_realtime::events::{ClientEvent, create_event_channel};
use auction_realtime::feeds::{BidFeed, MyBidsFeed, NotificationsFeed};
use auction_realtime::notifier::{EventNotifier, NotificationPermission, SilentNotifier};
use auction_realtime::protocol::topics;
use auction_realtime::stomp::StompCommand;
use auction_realtime::status::AuctionStatus;
use common::{FakeBroker, channel_with, eventually};
use mockall::mock;
use std::sync::Arc;

mock! {
    pub Api {}

    #[async_trait]
    impl AuctionApi for Api {
        async fn my_bids(&self) -> Result<Vec<MyBidSummary>>;
        async fn unread_notification_count(&self) -> Result<u64>;
    }
}

fn summary(product_id: i64, amount: i64) -> MyBidSummary {
    MyBidSummary {
        product_id,
        product_name: Some(format!("상품 {product_id}")),
        bid_amount: Some(amount),
        current_price: Some(amount),
        status: Some("BIDDING".into()),
        auction_end_time: None,
    }
}

const OUTBID: &str = r#"{"type":"NOTIFICATION","content":"다른 사용자가 더 높은 금액으로 입찰했습니다","data":{"type":"OUTBID","productId":10,"currentPrice":20000}}"#;

#[tokio::test]
async fn test_bid_feed_follows_one_product() {
    let broker = FakeBroker::new();
    let channel = channel_with(&broker, None);
    channel.connect().await.unwrap();

    let feed = BidFeed::open(channel.clone(), Some(1), &FeedConfig::default());
    assert!(eventually(|| broker.subscribed() == vec![topics::auction_timer(1), topics::bid(1)]).await);

    broker.publish(
        &topics::bid(1),
        r#"{"type":"BID","content":"","data":{"productId":1,"currentPrice":15000,"bidCount":3,"bidder":"kim"}}"#,
    );
    assert!(eventually(|| feed.view().data.bid.is_some()).await);
    let bid = feed.view().data.bid.unwrap();
    assert_eq!(bid.current_price, 15000);
    assert_eq!(bid.bid_count, 3);

    broker.publish(&topics::bid(1), r#"{"type":"SYSTEM","content":"경매가 종료되었습니다"}"#);
    assert!(eventually(|| feed.view().data.status == AuctionStatus::Ended).await);

    // same product again is a no-op
    feed.set_product(Some(1));
    assert_eq!(broker.count(StompCommand::Subscribe), 2);

    feed.set_product(Some(2));
    assert!(eventually(|| broker.subscribed() == vec![topics::auction_timer(2), topics::bid(2)]).await);
    let view = feed.view();
    assert_eq!(view.data.product_id, Some(2));
    assert!(view.data.bid.is_none());

    feed.set_product(None);
    let view = feed.view();
    assert_eq!(view.error.as_deref(), Some("product id is required"));
    assert!(!view.is_subscribed);
    assert!(eventually(|| broker.subscribed().is_empty()).await);
}

#[tokio::test]
async fn test_dropping_a_feed_releases_its_topics() {
    let broker = FakeBroker::new();
    let channel = channel_with(&broker, None);
    channel.connect().await.unwrap();

    let feed = BidFeed::open(channel.clone(), Some(5), &FeedConfig::default());
    assert!(eventually(|| broker.subscribed().len() == 2).await);

    drop(feed);
    assert!(eventually(|| broker.subscribed().is_empty()).await);
    assert!(channel.active_topics().is_empty());
}

#[tokio::test]
async fn test_my_bids_loads_then_subscribes() {
    let broker = FakeBroker::new();
    let channel = channel_with(&broker, None);
    channel.connect().await.unwrap();

    let mut api = MockApi::new();
    api.expect_my_bids()
        .times(1)
        .returning(|| Ok(vec![summary(10, 18000), summary(11, 5000), summary(10, 17000)]));

    let (tx, mut rx) = create_event_channel();
    let feed = MyBidsFeed::new(
        channel.clone(),
        Arc::new(api),
        Arc::new(EventNotifier::new(tx, NotificationPermission::Granted)),
    );

    feed.set_user(Some(7)).await;
    let view = feed.view();
    assert_eq!(view.data.entries.len(), 2);
    assert!(view.is_subscribed);

    let mut expected = vec![
        topics::bid(10),
        topics::bid(11),
        topics::USER_NOTIFICATIONS.to_string(),
    ];
    expected.sort();
    assert!(eventually(|| broker.subscribed() == expected).await);

    // same user: no second REST call, no resubscription
    feed.set_user(Some(7)).await;
    assert_eq!(broker.count(StompCommand::Subscribe), 3);

    broker.publish(topics::USER_NOTIFICATIONS, OUTBID);
    assert!(eventually(|| feed.view().data.entry(10).is_some_and(|e| e.is_outbid)).await);
    assert_eq!(feed.view().data.entry(10).unwrap().current_price, Some(20000));

    let shown = loop {
        match rx.recv().await {
            Some(ClientEvent::DesktopNotification(n)) => break n,
            Some(_) => continue,
            None => panic!("event bus closed"),
        }
    };
    assert!(shown.title.contains("상위 입찰 발생"));
}

#[tokio::test]
async fn test_my_bids_failure_subscribes_nothing() {
    let broker = FakeBroker::new();
    let channel = channel_with(&broker, None);
    channel.connect().await.unwrap();

    let mut api = MockApi::new();
    api.expect_my_bids()
        .returning(|| Err(AuctionRealtimeError::Timeout));
    let feed = MyBidsFeed::new(channel.clone(), Arc::new(api), Arc::new(SilentNotifier));

    feed.set_user(Some(7)).await;
    let view = feed.view();
    assert!(view.error.is_some());
    assert!(!view.is_subscribed);
    assert!(channel.active_topics().is_empty());
    assert_eq!(broker.count(StompCommand::Subscribe), 0);
}

#[tokio::test]
async fn test_my_bids_without_user_reports_error() {
    let broker = FakeBroker::new();
    let channel = channel_with(&broker, None);
    let mut api = MockApi::new();
    api.expect_my_bids().never();
    let feed = MyBidsFeed::new(channel, Arc::new(api), Arc::new(SilentNotifier));

    feed.set_user(None).await;
    assert_eq!(feed.view().error.as_deref(), Some("user id is required"));
}

#[tokio::test]
async fn test_my_bids_logout_tears_down() {
    let broker = FakeBroker::new();
    let channel = channel_with(&broker, None);
    channel.connect().await.unwrap();

    let mut api = MockApi::new();
    api.expect_my_bids().times(1).returning(|| Ok(vec![summary(10, 18000)]));
    let feed = MyBidsFeed::new(channel.clone(), Arc::new(api), Arc::new(SilentNotifier));

    feed.set_user(Some(7)).await;
    assert!(eventually(|| broker.subscribed().len() == 2).await);

    feed.set_user(None).await;
    let view = feed.view();
    assert_eq!(view.error.as_deref(), Some("user id is required"));
    assert!(!view.is_subscribed);
    assert!(view.data.entries.is_empty());
    assert!(eventually(|| broker.subscribed().is_empty()).await);

    // repeated logouts keep reporting the error
    feed.set_user(None).await;
    assert_eq!(feed.view().error.as_deref(), Some("user id is required"));
}

#[tokio::test]
async fn test_feeds_share_the_notification_queue() {
    let broker = FakeBroker::new();
    let channel = channel_with(&broker, None);
    channel.connect().await.unwrap();

    let mut api = MockApi::new();
    api.expect_my_bids().returning(|| Ok(vec![summary(10, 18000)]));
    let my_bids = MyBidsFeed::new(channel.clone(), Arc::new(api), Arc::new(SilentNotifier));
    let notifications = NotificationsFeed::new(
        channel.clone(),
        Arc::new(SilentNotifier),
        &FeedConfig::default(),
    );

    notifications.open();
    my_bids.set_user(Some(7)).await;
    assert!(eventually(|| broker.subscribed().len() == 2).await);
    let queue_subscriptions = broker
        .frames(StompCommand::Subscribe)
        .iter()
        .filter(|f| f.header("destination") == Some(topics::USER_NOTIFICATIONS))
        .count();
    assert_eq!(queue_subscriptions, 1);

    broker.publish(topics::USER_NOTIFICATIONS, OUTBID);
    assert!(eventually(|| notifications.view().data.entries.len() == 1).await);
    assert!(eventually(|| my_bids.view().data.entry(10).is_some_and(|e| e.is_outbid)).await);

    // closing one feed keeps the queue alive for the other
    notifications.close();
    assert!(channel.active_topics().contains(&topics::USER_NOTIFICATIONS.to_string()));
    broker.publish(topics::USER_NOTIFICATIONS, OUTBID);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(notifications.view().data.entries.len(), 1);
}

#[tokio::test]
async fn test_notifications_mark_read() {
    let broker = FakeBroker::new();
    let channel = channel_with(&broker, None);
    channel.connect().await.unwrap();

    let feed = NotificationsFeed::new(channel, Arc::new(SilentNotifier), &FeedConfig::default());
    feed.open();
    assert!(eventually(|| !broker.subscribed().is_empty()).await);

    for id in 1..=3 {
        broker.publish(
            topics::USER_NOTIFICATIONS,
            &format!(r#"{{"type":"NOTIFICATION","content":"알림","data":{{"id":{id},"type":"BID_SUCCESS"}}}}"#),
        );
    }
    assert!(eventually(|| feed.view().data.entries.len() == 3).await);
    assert_eq!(feed.view().data.unread_count(), 3);

    assert!(feed.mark_as_read("2"));
    assert_eq!(feed.view().data.unread_count(), 2);
    assert!(feed.mark_all_as_read());
    assert_eq!(feed.view().data.unread_count(), 0);
    assert!(feed.clear_notifications());
    assert!(feed.view().data.entries.is_empty());
}

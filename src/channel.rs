/// file: src/channel.rs
/// description: Single duplex STOMP channel with deferred subscriptions and bounded reconnection
use crate::auth::CredentialSource;
use crate::client_state::ChannelStats;
use crate::config::ChannelConfig;
use crate::dispatcher::{self, Dispatch};
use crate::error::{AuctionRealtimeError, Result};
use crate::events::{self, ClientEvent, EventSender};
use crate::monitoring::{
    ACTIVE_SUBSCRIPTIONS_GAUGE, CONNECTED_GAUGE, FRAMES_DROPPED_COUNTER, HealthStatus,
    RECONNECT_COUNTER,
};
use crate::protocol::{InboundMessage, topics};
use crate::registry::{ListenerKey, MessageCallback, SubscriptionHandle, SubscriptionRegistry};
use crate::stomp::{HEARTBEAT, StompCommand, StompFrame};
use crate::transport::{Transport, TransportEvent, TransportLink, WebSocketTransport};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVisibility {
    Visible,
    Hidden,
}

struct Shared {
    state: ConnectionState,
    registry: SubscriptionRegistry,
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Bumped on every connect attempt and teardown; tasks holding an older value are stale.
    generation: u64,
    reconnect_attempts: u32,
    reconnect_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl Shared {
    fn abort_tasks(&mut self) {
        for task in [
            self.reconnect_task.take(),
            self.reader_task.take(),
            self.heartbeat_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }

    fn send_frame(&self, frame: StompFrame) {
        if let Some(tx) = &self.outbound
            && tx.send(frame.encode()).is_err()
        {
            debug!("Transport pump gone, dropping {} frame", frame.command);
        }
    }
}

struct ChannelInner {
    config: ChannelConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    events: Option<EventSender>,
    stats: ChannelStats,
    connected: watch::Sender<bool>,
    shared: Mutex<Shared>,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if let Ok(shared) = self.shared.get_mut() {
            shared.abort_tasks();
        }
    }
}

/// Cheap-to-clone handle to one duplex channel. All clones share the
/// connection, the subscription registry and the `is_connected` signal.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<ChannelInner>,
}

impl fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &self.connection_state())
            .finish()
    }
}

impl RealtimeChannel {
    pub fn new(
        config: ChannelConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
        events: Option<EventSender>,
    ) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(ChannelInner {
                config,
                transport,
                credentials,
                events,
                stats: ChannelStats::new(),
                connected,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    registry: SubscriptionRegistry::new(),
                    outbound: None,
                    generation: 0,
                    reconnect_attempts: 0,
                    reconnect_task: None,
                    reader_task: None,
                    heartbeat_task: None,
                }),
            }),
        }
    }

    pub fn websocket(
        config: ChannelConfig,
        credentials: Arc<dyn CredentialSource>,
        events: Option<EventSender>,
    ) -> Self {
        Self::new(config, Arc::new(WebSocketTransport::new()), credentials, events)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // A poisoned lock only means a callback panicked elsewhere; the maps stay consistent.
        self.inner
            .shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: ClientEvent) {
        events::publish(self.inner.events.as_ref(), event);
    }

    /// Opens the transport and performs the STOMP handshake. A no-op while
    /// already connecting or connected. A failed attempt schedules a retry.
    pub async fn connect(&self) -> Result<()> {
        let Some(generation) = begin_connect(&mut self.lock()) else {
            debug!("connect() ignored, channel already active");
            return Ok(());
        };
        self.establish(generation).await
    }

    async fn establish(&self, generation: u64) -> Result<()> {
        let url = self.inner.config.url.clone();
        self.publish(ClientEvent::Connecting {
            url: url.to_string(),
        });
        info!(%url, generation, "Connecting realtime channel");

        let outcome = tokio::time::timeout(self.inner.config.connect_timeout, self.handshake())
            .await
            .map_err(|_| AuctionRealtimeError::Timeout)
            .and_then(|result| result);

        let (link, connected_frame) = match outcome {
            Ok(ok) => ok,
            Err(e) => {
                error!("Connection attempt failed: {}", e);
                self.handle_connection_loss(generation, e.to_string());
                return Err(e);
            }
        };

        let heartbeat = connected_frame.negotiated_heartbeat(self.inner.config.heartbeat);
        let TransportLink { outbound, inbound } = link;

        let (connection_id, restored, active) = {
            let mut shared = self.lock();
            if shared.generation != generation || shared.state != ConnectionState::Connecting {
                debug!(generation, "Channel torn down during handshake, discarding link");
                return Ok(());
            }

            shared.state = ConnectionState::Connected;
            shared.reconnect_attempts = 0;
            shared.outbound = Some(outbound.clone());

            let restored = restore_locked(&mut shared);

            let weak = Arc::downgrade(&self.inner);
            shared.reader_task = Some(tokio::spawn(read_loop(weak, generation, inbound)));
            if let Some(period) = heartbeat {
                debug!(?period, "Heart-beating enabled");
                shared.heartbeat_task = Some(spawn_heartbeat(outbound, period));
            }

            (
                self.inner.stats.reset_connection(),
                restored,
                shared.registry.active_count(),
            )
        };

        self.inner.connected.send_replace(true);
        CONNECTED_GAUGE.set(1.0);
        ACTIVE_SUBSCRIPTIONS_GAUGE.set(active as f64);
        info!(%connection_id, restored = restored.len(), "Realtime channel connected");

        self.publish(ClientEvent::Connected { connection_id });
        for handle in restored {
            self.publish(ClientEvent::Subscribed { topic: handle.topic });
        }
        Ok(())
    }

    async fn handshake(&self) -> Result<(TransportLink, StompFrame)> {
        let url = &self.inner.config.url;
        let mut link = self.inner.transport.open(url).await?;

        let host = url.host_str().unwrap_or("localhost");
        let token = self.inner.credentials.bearer_token();
        if token.is_none() {
            debug!("No access token, connecting anonymously");
        }
        let connect = StompFrame::connect(host, token.as_deref(), self.inner.config.heartbeat);
        link.outbound
            .send(connect.encode())
            .map_err(|_| AuctionRealtimeError::ConnectionClosed)?;

        loop {
            match link.inbound.recv().await {
                Some(TransportEvent::Text(text)) => {
                    for frame in StompFrame::decode_all(&text)? {
                        match frame.command {
                            StompCommand::Connected => return Ok((link, frame)),
                            StompCommand::Error => {
                                let message = frame
                                    .header("message")
                                    .map(str::to_string)
                                    .unwrap_or_else(|| frame.body.clone());
                                return Err(AuctionRealtimeError::ServerError { message });
                            }
                            other => debug!("Ignoring {} frame before CONNECTED", other),
                        }
                    }
                }
                Some(TransportEvent::Closed(reason)) => {
                    debug!(?reason, "Transport closed during handshake");
                    return Err(AuctionRealtimeError::ConnectionClosed);
                }
                None => return Err(AuctionRealtimeError::ConnectionClosed),
            }
        }
    }

    /// Failed attempt or unsolicited close: drop handles, keep callbacks, back off.
    fn handle_connection_loss(&self, generation: u64, reason: String) {
        let (attempts, delay) = {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }

            shared.state = ConnectionState::Disconnected;
            shared.outbound = None;
            if let Some(task) = shared.heartbeat_task.take() {
                task.abort();
            }
            // Detach rather than abort: this may be running on the reader task itself.
            shared.reader_task = None;
            let released = shared.registry.release_handles();
            if released > 0 {
                debug!(released, "Released transport handles, callbacks kept");
            }

            shared.reconnect_attempts += 1;
            let attempts = shared.reconnect_attempts;
            let delay = self.inner.config.backoff.delay_for(attempts);
            if let Some(delay) = delay {
                let weak = Arc::downgrade(&self.inner);
                shared.reconnect_task = Some(tokio::spawn(reconnect_after(weak, generation, delay)));
            }
            (attempts, delay)
        };

        self.inner.stats.clear_connection();
        self.inner.connected.send_replace(false);
        CONNECTED_GAUGE.set(0.0);
        ACTIVE_SUBSCRIPTIONS_GAUGE.set(0.0);
        self.publish(ClientEvent::ConnectionFailed(reason));

        match delay {
            Some(delay) => {
                RECONNECT_COUNTER.increment(1);
                self.inner.stats.record_reconnect();
                warn!(
                    "Reconnecting in {} ms (attempt {})",
                    delay.as_millis(),
                    attempts
                );
                self.publish(ClientEvent::Reconnecting {
                    attempt: attempts,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            None => {
                error!("Maximum reconnection attempts ({}) reached", attempts);
                self.publish(ClientEvent::ReconnectExhausted { attempts });
            }
        }
    }

    /// Cancels any pending retry, closes the transport and forgets every
    /// subscription together with its callback.
    pub fn disconnect(&self) {
        let (handles, outbound, was) = {
            let mut shared = self.lock();
            shared.generation += 1;
            shared.abort_tasks();
            shared.reconnect_attempts = 0;
            let was = shared.state;
            shared.state = ConnectionState::Disconnected;
            (shared.registry.clear(), shared.outbound.take(), was)
        };

        if let Some(tx) = outbound {
            for handle in &handles {
                let _ = tx.send(StompFrame::unsubscribe(&handle.id).encode());
            }
            let _ = tx.send(StompFrame::disconnect().encode());
        }

        self.inner.stats.clear_connection();
        self.inner.connected.send_replace(false);
        CONNECTED_GAUGE.set(0.0);
        ACTIVE_SUBSCRIPTIONS_GAUGE.set(0.0);
        info!(previous = %was, dropped = handles.len(), "Realtime channel disconnected");
        self.publish(ClientEvent::Disconnected);
    }

    /// Registers `callback` for `topic` under the default listener key.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> String
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.subscribe_as(topic, ListenerKey::default(), Arc::new(callback))
    }

    /// Registers a keyed listener. The topic's transport subscription is
    /// opened at most once and only while connected; otherwise it waits for
    /// the next connect. A key already listening on an active topic keeps its
    /// original callback.
    pub fn subscribe_as(&self, topic: &str, key: ListenerKey, callback: MessageCallback) -> String {
        let (opened, active) = {
            let mut shared = self.lock();
            if shared.state == ConnectionState::Connected
                && shared.registry.is_active(topic)
                && shared.registry.has_listener(topic, &key)
            {
                trace!(topic, key = key.as_str(), "Already subscribed");
                return topic.to_string();
            }
            shared.registry.store(topic, key, callback);
            let opened = if shared.state == ConnectionState::Connected {
                let handle = shared.registry.activate(topic);
                if let Some(handle) = &handle {
                    shared.send_frame(StompFrame::subscribe(&handle.id, &handle.topic));
                }
                handle
            } else {
                trace!(topic, state = %shared.state, "Deferring subscription");
                None
            };
            (opened, shared.registry.active_count())
        };

        if let Some(handle) = opened {
            debug!(topic, id = %handle.id, "Subscribed");
            ACTIVE_SUBSCRIPTIONS_GAUGE.set(active as f64);
            self.publish(ClientEvent::Subscribed { topic: handle.topic });
        }
        topic.to_string()
    }

    /// Cancels the default listener of an active topic. Without an active
    /// transport handle this does nothing and the stored callback is kept for
    /// the next connect.
    pub fn unsubscribe(&self, topic: &str) {
        if !self.lock().registry.is_active(topic) {
            trace!(topic, "No active subscription, unsubscribe ignored");
            return;
        }
        self.remove_listener(topic, &ListenerKey::default());
    }

    /// Forgets one keyed listener, pending or active. The transport
    /// subscription is cancelled with the last listener.
    pub fn remove_listener(&self, topic: &str, key: &ListenerKey) {
        let (cancelled, active) = {
            let mut shared = self.lock();
            let cancelled = shared.registry.remove_listener(topic, key);
            if let Some(handle) = &cancelled
                && shared.state == ConnectionState::Connected
            {
                shared.send_frame(StompFrame::unsubscribe(&handle.id));
            }
            (cancelled, shared.registry.active_count())
        };

        if let Some(handle) = cancelled {
            debug!(topic, id = %handle.id, "Unsubscribed");
            ACTIVE_SUBSCRIPTIONS_GAUGE.set(active as f64);
            self.publish(ClientEvent::Unsubscribed { topic: handle.topic });
        }
    }

    /// Opens a transport subscription for every stored topic that lacks one.
    /// Runs automatically after each successful connect.
    pub fn restore_subscriptions(&self) -> usize {
        let restored = {
            let mut shared = self.lock();
            if shared.state != ConnectionState::Connected {
                return 0;
            }
            restore_locked(&mut shared)
        };
        let count = restored.len();
        for handle in restored {
            self.publish(ClientEvent::Subscribed { topic: handle.topic });
        }
        count
    }

    /// Publishes `body` as JSON to `/app/{destination}`.
    pub fn send<T: Serialize>(&self, destination: &str, body: &T) -> Result<()> {
        let payload = serde_json::to_string(body)?;
        let shared = self.lock();
        if shared.state != ConnectionState::Connected {
            return Err(AuctionRealtimeError::NotConnected);
        }
        let tx = shared
            .outbound
            .as_ref()
            .ok_or(AuctionRealtimeError::NotConnected)?;
        tx.send(StompFrame::send(&topics::app(destination), payload).encode())
            .map_err(|_| AuctionRealtimeError::ConnectionClosed)
    }

    /// Foreground transitions reconnect a channel that is down; background ones do nothing.
    pub async fn handle_visibility(&self, visibility: PageVisibility) -> Result<()> {
        match visibility {
            PageVisibility::Visible if self.connection_state() != ConnectionState::Connected => {
                info!("Page visible while disconnected, reconnecting");
                self.connect().await
            }
            _ => Ok(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.lock().reconnect_attempts
    }

    pub fn connection_id(&self) -> Option<String> {
        self.inner.stats.connection_id()
    }

    pub fn active_topics(&self) -> Vec<String> {
        self.lock().registry.active_topics()
    }

    pub fn pending_topics(&self) -> Vec<String> {
        self.lock().registry.pending_topics()
    }

    pub fn health(&self) -> HealthStatus {
        let (state, attempts, active, pending) = {
            let shared = self.lock();
            (
                shared.state,
                shared.reconnect_attempts,
                shared.registry.active_count(),
                shared.registry.pending_topics().len(),
            )
        };
        let stats = &self.inner.stats;
        HealthStatus {
            is_healthy: state == ConnectionState::Connected,
            connection_id: stats.connection_id(),
            last_message_time: stats.last_message_at(),
            total_frames: stats.total_frames.load(Ordering::Relaxed),
            dropped_frames: stats.dropped_frames.load(Ordering::Relaxed),
            reconnect_attempts: attempts,
            active_subscriptions: active,
            pending_subscriptions: pending,
            uptime: stats.uptime(),
        }
    }

    fn handle_text(&self, generation: u64, text: &str) {
        let frames = match StompFrame::decode_all(text) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Dropping undecodable STOMP text: {}", e);
                self.inner.stats.record_dropped();
                FRAMES_DROPPED_COUNTER.increment(1);
                self.publish(ClientEvent::FrameDropped {
                    topic: String::new(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        for frame in frames {
            match frame.command {
                StompCommand::Message => self.handle_message(generation, &frame),
                StompCommand::Error => {
                    let message = frame
                        .header("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| frame.body.clone());
                    warn!(%message, "Server sent ERROR frame");
                    self.publish(ClientEvent::ServerError { message });
                }
                StompCommand::Receipt => {
                    trace!(receipt = ?frame.header("receipt-id"), "Receipt");
                }
                other => debug!("Ignoring unexpected {} frame", other),
            }
        }
    }

    fn handle_message(&self, generation: u64, frame: &StompFrame) {
        self.inner.stats.record_frame();

        let routed = {
            let shared = self.lock();
            if shared.generation != generation {
                return;
            }
            dispatcher::route(&shared.registry, frame)
        };

        let Some((topic, listeners)) = routed else {
            debug!(
                subscription = ?frame.header("subscription"),
                destination = ?frame.header("destination"),
                "No listener for frame"
            );
            return;
        };

        if let Dispatch::Dropped { topic, reason } = dispatcher::deliver(&topic, &frame.body, &listeners) {
            self.inner.stats.record_dropped();
            self.publish(ClientEvent::FrameDropped { topic, reason });
        }
    }
}

fn begin_connect(shared: &mut Shared) -> Option<u64> {
    if shared.state != ConnectionState::Disconnected {
        return None;
    }
    if let Some(task) = shared.reconnect_task.take() {
        task.abort();
    }
    shared.generation += 1;
    shared.state = ConnectionState::Connecting;
    Some(shared.generation)
}

fn restore_locked(shared: &mut Shared) -> Vec<SubscriptionHandle> {
    let restored = shared.registry.restore();
    for handle in &restored {
        shared.send_frame(StompFrame::subscribe(&handle.id, &handle.topic));
    }
    restored
}

async fn read_loop(
    weak: Weak<ChannelInner>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let channel = RealtimeChannel { inner };
        match event {
            TransportEvent::Text(text) => channel.handle_text(generation, &text),
            TransportEvent::Closed(reason) => {
                let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                warn!(%reason, "Transport closed");
                channel.handle_connection_loss(generation, reason);
                return;
            }
        }
    }

    if let Some(inner) = weak.upgrade() {
        RealtimeChannel { inner }.handle_connection_loss(generation, "transport ended".to_string());
    }
}

async fn reconnect_after(weak: Weak<ChannelInner>, token: u64, delay: Duration) {
    tokio::time::sleep(delay).await;

    let Some(inner) = weak.upgrade() else {
        return;
    };
    let channel = RealtimeChannel { inner };
    let generation = {
        let mut shared = channel.lock();
        if shared.generation != token {
            return;
        }
        // Dropped, not aborted: this is the task the handle refers to.
        shared.reconnect_task = None;
        begin_connect(&mut shared)
    };

    if let Some(generation) = generation
        && let Err(e) = channel.establish(generation).await
    {
        debug!("Reconnect attempt failed: {}", e);
    }
}

fn spawn_heartbeat(outbound: mpsc::UnboundedSender<String>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if outbound.send(HEARTBEAT.to_string()).is_err() {
                break;
            }
        }
    })
}

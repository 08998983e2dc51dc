use crate::error::AuctionRealtimeError;
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static FRAMES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("auction_frames_received_total"));
pub static FRAMES_DROPPED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("auction_frames_dropped_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("auction_reconnects_total"));
pub static SSE_EVENTS_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("auction_sse_events_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("auction_connected"));
pub static ACTIVE_SUBSCRIPTIONS_GAUGE: LazyLock<Gauge> =
    LazyLock::new(|| gauge!("auction_active_subscriptions"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "auction-realtime")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(_handle) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            FRAMES_RECEIVED_COUNTER.absolute(0);
            FRAMES_DROPPED_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            SSE_EVENTS_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);
            ACTIVE_SUBSCRIPTIONS_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(AuctionRealtimeError::MetricsError(e.to_string()).into())
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub connection_id: Option<String>,
    pub last_message_time: Option<chrono::DateTime<chrono::Utc>>,
    pub total_frames: u64,
    pub dropped_frames: u64,
    pub reconnect_attempts: u32,
    pub active_subscriptions: usize,
    pub pending_subscriptions: usize,
    pub uptime: chrono::Duration,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            is_healthy: false,
            connection_id: None,
            last_message_time: None,
            total_frames: 0,
            dropped_frames: 0,
            reconnect_attempts: 0,
            active_subscriptions: 0,
            pending_subscriptions: 0,
            uptime: chrono::Duration::zero(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_healthy { "healthy" } else { "unhealthy" },
            "connection_id": self.connection_id,
            "last_message_time": self.last_message_time,
            "total_frames": self.total_frames,
            "dropped_frames": self.dropped_frames,
            "reconnect_attempts": self.reconnect_attempts,
            "active_subscriptions": self.active_subscriptions,
            "pending_subscriptions": self.pending_subscriptions,
            "uptime_seconds": self.uptime.num_seconds(),
            "timestamp": chrono::Utc::now()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_json_reports_status() {
        let mut health = HealthStatus::new();
        assert_eq!(health.to_json()["status"], "unhealthy");

        health.is_healthy = true;
        health.active_subscriptions = 3;
        let json = health.to_json();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["active_subscriptions"], 3);
    }
}

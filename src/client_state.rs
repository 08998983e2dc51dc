/// file: src/client_state.rs
/// description: Per-channel counters kept apart from the connection logic
use chrono::{DateTime, Utc};
use std::sync::{
    Mutex,
    atomic::{AtomicU32, AtomicU64, Ordering},
};

#[derive(Debug)]
pub struct ChannelStats {
    connection_id: Mutex<Option<String>>,
    started_at: DateTime<Utc>,
    last_message_at: Mutex<Option<DateTime<Utc>>>,
    pub total_frames: AtomicU64,
    pub dropped_frames: AtomicU64,
    pub reconnects_scheduled: AtomicU32,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            connection_id: Mutex::new(None),
            started_at: Utc::now(),
            last_message_at: Mutex::new(None),
            total_frames: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            reconnects_scheduled: AtomicU32::new(0),
        }
    }
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh connection id for a successful connect.
    pub fn reset_connection(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        if let Ok(mut slot) = self.connection_id.lock() {
            *slot = Some(id.clone());
        }
        id
    }

    pub fn clear_connection(&self) {
        if let Ok(mut slot) = self.connection_id.lock() {
            *slot = None;
        }
    }

    pub fn connection_id(&self) -> Option<String> {
        self.connection_id.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn record_frame(&self) {
        self.total_frames.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut slot) = self.last_message_at.lock() {
            *slot = Some(Utc::now());
        }
    }

    pub fn record_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::AcqRel);
    }

    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_message_at.lock().ok().and_then(|slot| *slot)
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// file: src/sse.rs
/// description: Out-of-band unread notification count over Server-Sent Events
/// reference: https://html.spec.whatwg.org/multipage/server-sent-events.html
use crate::api::AuctionApi;
use crate::auth::CredentialSource;
use crate::backoff::BackoffPolicy;
use crate::config::SseConfig;
use crate::error::{AuctionRealtimeError, Result};
use crate::events::{self, ClientEvent, EventSender};
use crate::monitoring::SSE_EVENTS_COUNTER;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// Payload the server pushes right after the stream opens.
pub const CONNECTED_SENTINEL: &str = "CONNECTED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental `text/event-stream` decoder. Chunks may split lines and
/// UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}

/// Non-negative integer, including whole-valued floats such as `7.0`.
fn whole_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

/// Next unread count after one pushed payload: the sentinel changes nothing,
/// a JSON object with a numeric `unreadCount` sets the count, anything else adds one.
pub fn apply_unread_event(current: u64, data: &str) -> u64 {
    let data = data.trim();
    if data == CONNECTED_SENTINEL || data == format!("\"{CONNECTED_SENTINEL}\"") {
        return current;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => match map.get("unreadCount").and_then(whole_count) {
            Some(count) => count,
            None => current.saturating_add(1),
        },
        _ => current.saturating_add(1),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCountView {
    pub count: u64,
    pub connected: bool,
    pub error: Option<String>,
}

/// Background SSE reader that keeps an unread count current. Independent of
/// the duplex channel; retries follow the shared backoff policy.
pub struct UnreadCountChannel {
    view: watch::Receiver<UnreadCountView>,
    task: JoinHandle<()>,
}

impl UnreadCountChannel {
    pub fn spawn(
        config: SseConfig,
        client: reqwest::Client,
        credentials: Arc<dyn CredentialSource>,
        seed: Option<Arc<dyn AuctionApi>>,
        events: Option<EventSender>,
    ) -> Self {
        let (tx, view) = watch::channel(UnreadCountView::default());
        let task = tokio::spawn(run(config, client, credentials, seed, events, tx));
        Self { view, task }
    }

    pub fn view(&self) -> UnreadCountView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<UnreadCountView> {
        self.view.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for UnreadCountChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    config: SseConfig,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
    seed: Option<Arc<dyn AuctionApi>>,
    events: Option<EventSender>,
    view: watch::Sender<UnreadCountView>,
) {
    if let Some(api) = seed {
        match api.unread_notification_count().await {
            Ok(count) => {
                debug!(count, "Seeded unread count");
                view.send_modify(|v| v.count = count);
                events::publish(events.as_ref(), ClientEvent::UnreadCount { count });
            }
            Err(e) => warn!("Failed to load unread count: {}", e),
        }
    }

    let mut failures = 0u32;
    loop {
        let outcome = stream_once(
            &config.url,
            &client,
            credentials.as_ref(),
            &view,
            events.as_ref(),
            &mut failures,
        )
        .await;

        let reason = match outcome {
            Ok(()) => "event stream ended".to_string(),
            Err(e) => e.to_string(),
        };
        failures += 1;
        view.send_modify(|v| {
            v.connected = false;
            v.error = Some(reason.clone());
        });
        events::publish(events.as_ref(), ClientEvent::SseError(reason.clone()));

        match next_delay(&config.backoff, failures) {
            Some(delay) => {
                warn!(
                    "SSE stream failed ({}), retrying in {} ms (attempt {})",
                    reason,
                    delay.as_millis(),
                    failures
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                error!("SSE stream giving up after {} failures", failures);
                return;
            }
        }
    }
}

fn next_delay(policy: &BackoffPolicy, failures: u32) -> Option<std::time::Duration> {
    policy.delay_for(failures)
}

async fn stream_once(
    url: &Url,
    client: &reqwest::Client,
    credentials: &dyn CredentialSource,
    view: &watch::Sender<UnreadCountView>,
    events: Option<&EventSender>,
    failures: &mut u32,
) -> Result<()> {
    let mut request = client
        .get(url.clone())
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache");
    if let Some(token) = credentials.bearer_token() {
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

    info!(%url, "SSE stream open");
    *failures = 0;
    view.send_modify(|v| {
        v.connected = true;
        v.error = None;
    });

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| AuctionRealtimeError::SseError(e.to_string()))?;
        for event in decoder.push(&chunk) {
            if event.event != "notification" && event.event != "message" {
                debug!(event = %event.event, "Ignoring SSE event");
                continue;
            }
            SSE_EVENTS_COUNTER.increment(1);
            let mut count = 0;
            view.send_modify(|v| {
                v.count = apply_unread_event(v.count, &event.data);
                count = v.count;
            });
            events::publish(events, ClientEvent::UnreadCount { count });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_count_semantics() {
        assert_eq!(apply_unread_event(3, "CONNECTED"), 3);
        assert_eq!(apply_unread_event(3, r#"{"unreadCount": 7}"#), 7);
        assert_eq!(apply_unread_event(3, r#"{"unreadCount": 0}"#), 0);
        assert_eq!(apply_unread_event(3, r#"{"unreadCount": 7.0}"#), 7);
        assert_eq!(apply_unread_event(3, r#"{"unreadCount": 7.5}"#), 4);
        assert_eq!(apply_unread_event(3, r#"{"unreadCount": -1}"#), 4);
        assert_eq!(apply_unread_event(3, r#"{"message":"새 알림"}"#), 4);
        assert_eq!(apply_unread_event(3, r#"{"unreadCount":"9"}"#), 4);
        assert_eq!(apply_unread_event(3, "새 알림이 도착했습니다"), 4);
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: notifi").is_empty());
        assert!(decoder.push(b"cation\r\ndata: CONNEC").is_empty());
        let events = decoder.push(b"TED\r\n\r\n");

        assert_eq!(
            events,
            vec![SseEvent {
                event: "notification".into(),
                data: "CONNECTED".into(),
                id: None
            }]
        );
    }

    #[test]
    fn test_decoder_multiline_data_comments_and_ids() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nid: 5\ndata: {\"a\":\ndata: 1}\n\ndata:plain\n\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "{\"a\":\n1}");
        assert_eq!(events[0].id.as_deref(), Some("5"));
        assert_eq!(events[1].data, "plain");
        assert_eq!(events[1].id.as_deref(), Some("5"));
    }

    #[test]
    fn test_decoder_keeps_utf8_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: 알림\n\n".as_bytes();
        let (head, tail) = bytes.split_at(8);
        assert!(decoder.push(head).is_empty());
        let events = decoder.push(tail);
        assert_eq!(events[0].data, "알림");
    }

    #[test]
    fn test_event_without_data_is_not_dispatched() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: notification\n\n").is_empty());
        let events = decoder.push(b"data: x\n\n");
        assert_eq!(events[0].event, "message");
    }
}

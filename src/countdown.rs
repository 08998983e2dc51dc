/// file: src/countdown.rs
/// description: Local countdown that fills the gaps between authoritative timer pushes
use crate::protocol::TimerPayload;
use crate::status::AuctionStatus;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const ENDED_TEXT: &str = "경매 종료";

/// Whole remaining minutes at or below which an auction is ending soon.
pub const ENDING_SOON_MINUTES: i64 = 10;

/// Renders remaining time the way the auction pages show it.
pub fn format_remaining(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return ENDED_TEXT.to_string();
    }

    let days = remaining.num_days();
    let hours = remaining.num_hours() % 24;
    let minutes = remaining.num_minutes() % 60;

    if days > 0 {
        format!("{days}일 {hours}시간")
    } else if hours > 0 {
        format!("{hours}시간 {minutes}분")
    } else {
        format!("{minutes}분")
    }
}

/// Reads a server `timeLeft` back into a duration. Accepts the Korean unit
/// form ("1일 2시간", "3시간 5분", "7분", "30초") and `HH:MM:SS` / `MM:SS`.
pub fn parse_remaining(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text == ENDED_TEXT {
        return Some(Duration::zero());
    }
    if text.contains(':') {
        return parse_clock(text);
    }

    let mut total = Duration::zero();
    let mut matched = false;
    let mut digits = String::new();
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        if ch.is_whitespace() {
            rest = &rest[ch.len_utf8()..];
            continue;
        }

        let (unit, len): (fn(i64) -> Duration, usize) = if rest.starts_with("시간") {
            (Duration::hours, "시간".len())
        } else if rest.starts_with('일') {
            (Duration::days, '일'.len_utf8())
        } else if rest.starts_with('분') {
            (Duration::minutes, '분'.len_utf8())
        } else if rest.starts_with('초') {
            (Duration::seconds, '초'.len_utf8())
        } else {
            return None;
        };

        let value: i64 = digits.parse().ok()?;
        digits.clear();
        total += unit(value);
        matched = true;
        rest = &rest[len..];
    }

    (matched && digits.is_empty()).then_some(total)
}

fn parse_clock(text: &str) -> Option<Duration> {
    let parts = text
        .split(':')
        .map(|p| p.trim().parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [h, m, s] => Some(Duration::hours(*h) + Duration::minutes(*m) + Duration::seconds(*s)),
        [m, s] => Some(Duration::minutes(*m) + Duration::seconds(*s)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionTimerData {
    pub product_id: i64,
    pub time_left: String,
    pub is_ending_soon: bool,
    pub is_ended: bool,
    pub status: AuctionStatus,
    pub auction_end_time: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Countdown {
    data: AuctionTimerData,
}

impl Countdown {
    pub fn new(product_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            data: AuctionTimerData {
                product_id,
                time_left: String::new(),
                is_ending_soon: false,
                is_ended: false,
                status: AuctionStatus::Bidding,
                auction_end_time: None,
                last_update: now,
            },
        }
    }

    pub fn data(&self) -> &AuctionTimerData {
        &self.data
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.data.auction_end_time
    }

    /// Starts local ticking from an end time obtained out of band.
    pub fn seed_end_time(&mut self, end_time: DateTime<Utc>, now: DateTime<Utc>) {
        self.data.auction_end_time = Some(end_time);
        self.tick(now);
    }

    /// Recomputes the display from wall-clock arithmetic. Returns whether
    /// anything visible changed. Without a known end time it does nothing.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let Some(end) = self.data.auction_end_time else {
            return false;
        };
        let before = (
            self.data.time_left.clone(),
            self.data.is_ending_soon,
            self.data.is_ended,
            self.data.status,
        );

        self.apply_remaining(end - now);

        let changed = before
            != (
                self.data.time_left.clone(),
                self.data.is_ending_soon,
                self.data.is_ended,
                self.data.status,
            );
        if changed {
            self.data.last_update = now;
        }
        changed
    }

    /// Applies an authoritative timer push. Server values override local
    /// ones, and a `timeLeft` without an end time re-anchors the countdown.
    pub fn reconcile(&mut self, timer: &TimerPayload, now: DateTime<Utc>) {
        let server_remaining = timer.time_left.as_deref().and_then(parse_remaining);

        if let Some(end) = timer.end_time() {
            self.data.auction_end_time = Some(end);
        } else if let Some(remaining) = server_remaining {
            self.data.auction_end_time = Some(now + remaining);
        }

        if let Some(end) = self.data.auction_end_time {
            self.apply_remaining(end - now);
        }

        if let Some(time_left) = timer.time_left.as_ref().filter(|t| !t.trim().is_empty()) {
            self.data.time_left = time_left.clone();
        }
        if let Some(ending_soon) = timer.is_ending_soon {
            self.data.is_ending_soon = ending_soon;
        }
        if let Some(ended) = timer.is_ended {
            self.data.is_ended = ended;
            if ended && !self.data.status.is_closed() {
                self.data.status = AuctionStatus::Ended;
            }
        }
        if let Some(status) = timer.status() {
            self.data.status = status;
        }
        self.data.last_update = now;
    }

    /// Externally resolved status, e.g. from a SYSTEM message.
    pub fn set_status(&mut self, status: AuctionStatus) {
        self.data.status = status;
        if status.is_closed() {
            self.data.is_ended = true;
            self.data.is_ending_soon = false;
            self.data.time_left = ENDED_TEXT.to_string();
        }
    }

    fn apply_remaining(&mut self, remaining: Duration) {
        if self.data.status.is_closed() {
            return;
        }
        if remaining <= Duration::zero() {
            self.data.time_left = ENDED_TEXT.to_string();
            self.data.is_ended = true;
            self.data.is_ending_soon = false;
            self.data.status = AuctionStatus::Ended;
        } else {
            self.data.time_left = format_remaining(remaining);
            self.data.is_ended = false;
            self.data.is_ending_soon = remaining.num_minutes() <= ENDING_SOON_MINUTES;
        }
    }
}

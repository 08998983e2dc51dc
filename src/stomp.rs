/// file: src/stomp.rs
/// description: STOMP 1.2 text frame codec used on top of the WebSocket transport
/// reference: https://stomp.github.io/stomp-specification-1.2.html
use crate::error::{AuctionRealtimeError, Result};
use std::fmt;
use std::time::Duration;

const NULL: char = '\0';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let command = match line {
            "CONNECT" | "STOMP" => StompCommand::Connect,
            "CONNECTED" => StompCommand::Connected,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "SEND" => StompCommand::Send,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            "DISCONNECT" => StompCommand::Disconnect,
            _ => return None,
        };
        Some(command)
    }

    // CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(&self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First occurrence wins, as required for repeated headers.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, bearer: Option<&str>, heartbeat: Duration) -> Self {
        let beat = heartbeat.as_millis();
        let mut frame = StompFrame::new(StompCommand::Connect)
            .with_header("accept-version", "1.2,1.1")
            .with_header("host", host)
            .with_header("heart-beat", format!("{beat},{beat}"));
        if let Some(token) = bearer {
            frame = frame.with_header("Authorization", format!("Bearer {token}"));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        StompFrame::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        StompFrame::new(StompCommand::Unsubscribe).with_header("id", id)
    }

    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        StompFrame::new(StompCommand::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        StompFrame::new(StompCommand::Disconnect)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NULL);
        out
    }

    /// Decodes every complete frame in `text`. Heart-beat EOLs between frames
    /// are skipped.
    pub fn decode_all(text: &str) -> Result<Vec<StompFrame>> {
        let mut frames = Vec::new();
        for chunk in text.split(NULL) {
            let chunk = chunk.trim_start_matches(['\r', '\n']);
            if chunk.is_empty() {
                continue;
            }
            frames.push(Self::decode_one(chunk)?);
        }
        Ok(frames)
    }

    fn decode_one(chunk: &str) -> Result<StompFrame> {
        let (head, body) = match chunk.find("\n\n") {
            Some(idx) => (&chunk[..idx], &chunk[idx + 2..]),
            None => match chunk.find("\r\n\r\n") {
                Some(idx) => (&chunk[..idx], &chunk[idx + 4..]),
                None => (chunk, ""),
            },
        };

        let mut lines = head.lines();
        let command_line = lines.next().unwrap_or_default().trim_end_matches('\r');
        let command = StompCommand::parse(command_line).ok_or_else(|| {
            AuctionRealtimeError::StompError(format!("unknown command '{command_line}'"))
        })?;

        let unescape = command.escapes_headers();
        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                AuctionRealtimeError::StompError(format!("malformed header '{line}'"))
            })?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = StompFrame {
            command,
            headers,
            body: body.to_string(),
        };

        if let Some(length) = frame
            .header("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
            && length < frame.body.len()
            && frame.body.is_char_boundary(length)
        {
            frame.body.truncate(length);
        }

        Ok(frame)
    }

    /// Outgoing heart-beat period agreed with the server, if any.
    pub fn negotiated_heartbeat(&self, client_out: Duration) -> Option<Duration> {
        let (_, server_in) = parse_heartbeat(self.header("heart-beat")?)?;
        let client_out = client_out.as_millis() as u64;
        if client_out == 0 || server_in == 0 {
            return None;
        }
        Some(Duration::from_millis(client_out.max(server_in)))
    }
}

/// Heart-beat frame: a single EOL.
pub const HEARTBEAT: &str = "\n";

fn parse_heartbeat(value: &str) -> Option<(u64, u64)> {
    let (out, inc) = value.split_once(',')?;
    Some((out.trim().parse().ok()?, inc.trim().parse().ok()?))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(AuctionRealtimeError::StompError(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_frame_carries_bearer_unescaped() {
        let frame = StompFrame::connect("localhost", Some("abc:def"), Duration::from_secs(10));
        let encoded = frame.encode();

        assert!(encoded.starts_with("CONNECT\n"));
        assert!(encoded.contains("Authorization:Bearer abc:def\n"));
        assert!(encoded.contains("heart-beat:10000,10000\n"));
        assert!(encoded.ends_with("\n\n\0"));
    }

    #[test]
    fn test_connect_frame_without_token_has_no_authorization() {
        let frame = StompFrame::connect("localhost", None, Duration::ZERO);
        assert!(frame.header("Authorization").is_none());
        assert_eq!(frame.header("heart-beat"), Some("0,0"));
    }

    #[test]
    fn test_decode_message_frame() {
        let raw = "MESSAGE\nsubscription:sub-0\ndestination:/topic/bid/42\nmessage-id:1\n\n{\"type\":\"BID\"}\0";
        let frames = StompFrame::decode_all(raw).unwrap();

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.header("subscription"), Some("sub-0"));
        assert_eq!(frame.header("destination"), Some("/topic/bid/42"));
        assert_eq!(frame.body, "{\"type\":\"BID\"}");
    }

    #[test]
    fn test_decode_skips_heartbeats_and_splits_frames() {
        let raw = "\n\nCONNECTED\nversion:1.2\nheart-beat:0,5000\n\n\0\nRECEIPT\nreceipt-id:7\n\n\0\n";
        let frames = StompFrame::decode_all(raw).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, StompCommand::Connected);
        assert_eq!(frames[1].header("receipt-id"), Some("7"));
        assert!(StompFrame::decode_all(HEARTBEAT).unwrap().is_empty());
    }

    #[test]
    fn test_header_escaping_on_send_frames() {
        let frame = StompFrame::new(StompCommand::Message)
            .with_header("note", "a:b\nc")
            .with_body("x");
        let decoded = StompFrame::decode_all(&frame.encode()).unwrap();

        assert!(frame.encode().contains("note:a\\cb\\nc\n"));
        assert_eq!(decoded[0].header("note"), Some("a:b\nc"));
    }

    #[test]
    fn test_repeated_header_first_wins() {
        let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frames = StompFrame::decode_all(raw).unwrap();
        assert_eq!(frames[0].header("foo"), Some("first"));
    }

    #[test]
    fn test_content_length_truncates_body() {
        let raw = "MESSAGE\ncontent-length:2\n\nokTRAILING\0";
        let frames = StompFrame::decode_all(raw).unwrap();
        assert_eq!(frames[0].body, "ok");
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(StompFrame::decode_all("BOGUS\n\n\0").is_err());
    }

    #[test]
    fn test_negotiated_heartbeat() {
        let connected = StompFrame::new(StompCommand::Connected).with_header("heart-beat", "0,15000");
        assert_eq!(
            connected.negotiated_heartbeat(Duration::from_secs(10)),
            Some(Duration::from_secs(15))
        );

        let disabled = StompFrame::new(StompCommand::Connected).with_header("heart-beat", "0,0");
        assert_eq!(disabled.negotiated_heartbeat(Duration::from_secs(10)), None);
    }

    #[test]
    fn test_send_frame_sets_content_length() {
        let frame = StompFrame::send("/app/chat", "{}");
        assert_eq!(frame.header("content-length"), Some("2"));
        assert_eq!(frame.header("destination"), Some("/app/chat"));
    }
}

/// file: src/ui.rs
/// description: ui presentation layer that handles events from the channel and feeds
use crate::{
    events::{ClientEvent, EventReceiver},
    formatter::{Colors, OutputFormat, ViewFormatter},
};
use tracing::{debug, info};

pub struct UIController {
    event_receiver: EventReceiver,
    formatter: ViewFormatter,
    colored: bool,
    quiet_mode: bool,
    last_unread: Option<u64>,
}

pub struct UIOptions {
    pub colored: bool,
    pub quiet: bool,
}

impl UIController {
    pub fn new(event_receiver: EventReceiver, format: OutputFormat, options: UIOptions) -> Self {
        Self {
            event_receiver,
            formatter: ViewFormatter::new(format, options.colored),
            colored: options.colored,
            quiet_mode: options.quiet,
            last_unread: None,
        }
    }

    pub async fn run(&mut self) {
        self.print_startup_banner();
        while let Some(event) = self.event_receiver.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
    }

    /// Returns `false` once the client announced shutdown.
    pub fn handle_event(&mut self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Starting => {
                info!("Client starting...");
            }
            ClientEvent::Connecting { url } => {
                self.print_connection_status("CONNECTING", &url);
            }
            ClientEvent::Connected { connection_id } => {
                self.print_connection_status("CONNECTED", &format!("ID: {}", connection_id));
            }
            ClientEvent::Subscribed { topic } => {
                self.print_connection_status("SUBSCRIBED", &topic);
            }
            ClientEvent::Unsubscribed { topic } => {
                self.print_connection_status("UNSUBSCRIBED", &topic);
            }
            ClientEvent::FrameDropped { topic, reason } => {
                debug!(%topic, "Dropped frame: {}", reason);
            }
            ClientEvent::ServerError { message } => {
                self.print_error("SERVER ERROR", &message);
            }
            ClientEvent::ConnectionFailed(error) => {
                self.print_error("CONNECTION FAILED", &error);
            }
            ClientEvent::Reconnecting { attempt, delay_ms } => {
                self.print_reconnect_info(delay_ms, attempt);
            }
            ClientEvent::ReconnectExhausted { attempts } => {
                self.print_error(
                    "GAVE UP",
                    &format!("No connection after {attempts} attempts; waiting for a manual reconnect"),
                );
            }
            ClientEvent::Disconnected => {
                self.print_connection_status("DISCONNECTED", "Connection closed");
            }
            ClientEvent::DesktopNotification(notification) => {
                self.print_desktop_notification(&notification.title, &notification.body);
            }
            ClientEvent::UnreadCount { count } => {
                if self.last_unread != Some(count) {
                    self.last_unread = Some(count);
                    println!("{}", self.formatter.format_unread(count));
                }
            }
            ClientEvent::SseError(error) => {
                self.print_error("SSE", &error);
            }
            ClientEvent::FeedError { feed, message } => {
                println!("{}", self.formatter.format_feed_error(feed, &message));
            }
            ClientEvent::Stopping => {
                self.print_connection_status("STOPPING", "Client shutting down");
                return false;
            }
        }

        true
    }

    fn color(&self, color: &'static str) -> &'static str {
        if self.colored { color } else { "" }
    }

    fn print_startup_banner(&self) {
        if self.quiet_mode {
            return;
        }

        let frame = format!("{}{}", self.color(Colors::BOLD), self.color(Colors::BRIGHT_CYAN));
        let reset = self.color(Colors::RESET);
        println!();
        println!(
            "{}╔══════════════════════════════════════════════════════════════════════════════╗{}",
            frame, reset
        );
        println!(
            "{}║                         AUCTION REALTIME CLIENT                              ║{}",
            frame, reset
        );
        println!(
            "{}╠══════════════════════════════════════════════════════════════════════════════╣{}",
            frame, reset
        );
        println!(
            "{}║{} Version: {}{:<8}{} │ Transport: {}{:<14}{} │ Status: {}INITIALIZING{}{}          ║{}",
            frame,
            reset,
            self.color(Colors::BRIGHT_GREEN),
            env!("CARGO_PKG_VERSION"),
            reset,
            self.color(Colors::BRIGHT_YELLOW),
            "STOMP+SSE",
            reset,
            self.color(Colors::BRIGHT_MAGENTA),
            reset,
            frame,
            reset
        );
        println!(
            "{}╚══════════════════════════════════════════════════════════════════════════════╝{}",
            frame, reset
        );
        println!();
    }

    fn print_connection_status(&self, status: &str, message: &str) {
        if self.quiet_mode {
            return;
        }

        let (color, symbol) = match status {
            "CONNECTING" => (Colors::BRIGHT_YELLOW, "*"),
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "SUBSCRIBED" => (Colors::BRIGHT_BLUE, "~"),
            "UNSUBSCRIBED" => (Colors::GRAY, "-"),
            "DISCONNECTED" => (Colors::BRIGHT_RED, "X"),
            "STOPPING" => (Colors::BRIGHT_MAGENTA, "!"),
            _ => (Colors::WHITE, "-"),
        };

        println!(
            "{}{}[{}]{} {} {}{}{}",
            self.color(Colors::BOLD),
            self.color(color),
            status,
            self.color(Colors::RESET),
            symbol,
            self.color(Colors::WHITE),
            message,
            self.color(Colors::RESET)
        );
    }

    fn print_desktop_notification(&self, title: &str, body: &str) {
        println!(
            "{}{}[ALERT]{} {} {}{}{}",
            self.color(Colors::BOLD),
            self.color(Colors::BRIGHT_YELLOW),
            self.color(Colors::RESET),
            title,
            self.color(Colors::DIM),
            body,
            self.color(Colors::RESET)
        );
    }

    fn print_error(&self, error_type: &str, message: &str) {
        println!(
            "{}{}[{}]{} ! {}{}{}",
            self.color(Colors::BOLD),
            self.color(Colors::BRIGHT_RED),
            error_type,
            self.color(Colors::RESET),
            self.color(Colors::RED),
            message,
            self.color(Colors::RESET)
        );
    }

    fn print_reconnect_info(&self, delay_ms: u64, attempt: u32) {
        println!(
            "{}{}[RECONNECTING]{} > Attempt {} in {} ms...",
            self.color(Colors::BOLD),
            self.color(Colors::BRIGHT_YELLOW),
            self.color(Colors::RESET),
            attempt,
            delay_ms
        );
    }
}

#![doc = include_str!("../docs/rustdoc.md")]

/// REST calls for bid discovery and the unread count seed.
pub mod api;
/// Bearer credential sources.
pub mod auth;
/// Reconnection delay policy.
pub mod backoff;
/// Duplex STOMP channel with subscription bookkeeping and reconnection.
pub mod channel;
/// Command-line argument definitions.
pub mod cli;
/// Per-connection counters.
pub mod client_state;
/// Runtime configuration model.
pub mod config;
/// Auction end countdown.
pub mod countdown;
/// Routing of MESSAGE frames to listeners.
pub mod dispatcher;
/// Error types used across the crate.
pub mod error;
/// Event bus messages between the realtime layer and UI.
pub mod events;
/// Generic reducer-driven feed over channel topics.
pub mod feed;
/// Concrete feeds: bid, my-bids, my-auctions, notifications, home, rankings.
pub mod feeds;
/// Terminal output formatters.
pub mod formatter;
/// Metrics and health status structures.
pub mod monitoring;
/// Desktop notification seam.
pub mod notifier;
/// Topics and message envelope.
pub mod protocol;
/// Topic and listener registry.
pub mod registry;
/// Server-Sent Events unread count stream.
pub mod sse;
/// Auction status and keyword inference.
pub mod status;
/// STOMP 1.2 frame codec.
pub mod stomp;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Duplex text transport seam.
pub mod transport;
/// UI controller and presentation loop.
pub mod ui;

/// Primary crate error type.
pub use error::AuctionRealtimeError;

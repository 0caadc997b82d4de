//! Intrinio Real-Time Market Data Client
//!
//! Maintains authenticated WebSocket connections to Intrinio's streaming
//! endpoints for U.S. equities and options, decodes the binary framing
//! protocol into typed events, and dispatches them to user callbacks with
//! bounded backpressure. A replay mode feeds historical capture files
//! through the same event path, paced to wall clock or as fast as the
//! consumer drains.
//!
//! # Architecture
//!
//! ```text
//! Auth HTTP ──► Connection Manager ──► WebSocket
//!                      │                   │ raw frames
//!                      │             ┌─────▼──────┐    ┌─────────┐
//!  Subscription ◄──────┘             │  bounded   │───►│ worker  │──► callbacks
//!  Registry  (join/leave replayed    │   queue    │───►│  pool   │
//!             on every reconnect)    └─────▲──────┘    └─────────┘
//!                                          │
//!  Replay Engine (K-way merge of capture files)
//! ```
//!
//! The registry survives reconnects: every registered channel is re-joined
//! after a redial, in first-join order. The queue drops the newest frame on
//! overflow and accounts for it in [`ClientStats::dropped_frames`]. Frames
//! are decoded whole by one worker each, so intra-frame record order is
//! preserved; configure one worker when strict global ordering matters.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Auth-token HTTP client.
pub mod auth;
/// Public client API.
pub mod client;
/// Binary frame decoder.
pub mod codec;
/// Configuration and validation.
pub mod config;
/// Connection lifecycle state machine.
pub mod connection;
/// Typed market-data events.
pub mod events;
/// Heartbeat cadence and liveness watchdog.
pub mod heartbeat;
/// Provider endpoint and encoding profiles.
pub mod provider;
/// Reconnect backoff policy.
pub mod reconnect;
/// Historical capture replay.
pub mod replay;
/// Channel subscription registry.
pub mod subscription;

mod csv;
mod error;
mod queue;
mod stats;
mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{AuthClient, AuthError};
pub use client::Client;
pub use codec::{DecodeError, DecodedFrame, decode_frame};
pub use config::{Config, ConfigError, LogLevel, ReplayConfig};
pub use connection::{ClientEvent, ConnectionError, ConnectionState};
pub use error::ClientError;
pub use events::{
    EquitiesQuote, EquitiesTrade, OptionsExchange, OptionsQuote, OptionsRefresh, OptionsTrade,
    OptionsUnusualActivity, Quote, QuoteSide, StreamEvent, SubProvider, Trade,
    UnusualActivitySentiment, UnusualActivityType,
};
pub use heartbeat::HeartbeatConfig;
pub use provider::{ControlMessage, Provider, ProviderProfile, WireVariant};
pub use reconnect::ReconnectConfig;
pub use replay::ReplayError;
pub use stats::ClientStats;
pub use subscription::SubscriptionRegistry;
pub use worker::{
    Callbacks, QuoteHandler, RawHandler, RefreshHandler, TradeHandler, UnusualActivityHandler,
};

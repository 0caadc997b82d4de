//! Provider Profiles
//!
//! Maps a `(provider, delayed)` pair to the vendor endpoints and wire
//! conventions for that feed: auth URL, socket URL, heartbeat payload,
//! join/leave control-message encoding, and the binary layout variant.
//!
//! Equities feeds speak Phoenix-channel JSON for control traffic; options
//! feeds use a compact binary control prefix. The firehose sentinel is
//! spelled differently per provider, so call sites always go through
//! [`ProviderProfile::firehose_channel`] rather than hard-coding it.

use serde::Serialize;

/// Streaming feed provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// IEX-sourced real-time equities ("REALTIME").
    Realtime,
    /// IEX equities.
    Iex,
    /// Delayed SIP equities (CTA + UTP tapes).
    DelayedSip,
    /// Nasdaq Basic equities.
    NasdaqBasic,
    /// Cboe One equities.
    CboeOne,
    /// OPRA options.
    Opra,
    /// Options endpoint at a hand-supplied IP address.
    Manual,
}

impl Provider {
    /// Whether this provider streams options rather than equities.
    #[must_use]
    pub const fn is_options(&self) -> bool {
        matches!(self, Self::Opra | Self::Manual)
    }

    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "REALTIME",
            Self::Iex => "IEX",
            Self::DelayedSip => "DELAYED_SIP",
            Self::NasdaqBasic => "NASDAQ_BASIC",
            Self::CboeOne => "CBOE_ONE",
            Self::Opra => "OPRA",
            Self::Manual => "MANUAL",
        }
    }
}

/// Binary layout variant spoken by a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireVariant {
    /// Equities SIP-style records.
    Equities,
    /// OPRA options records.
    Options,
}

/// A control message ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Text frame (Phoenix-channel JSON).
    Text(String),
    /// Binary frame (options control prefix).
    Binary(Vec<u8>),
}

/// Phoenix-channel control frame for equities feeds.
#[derive(Serialize)]
struct PhoenixFrame<'a> {
    topic: &'a str,
    event: &'a str,
    payload: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "ref")]
    reference: Option<&'a str>,
}

impl<'a> PhoenixFrame<'a> {
    fn new(topic: &'a str, event: &'a str, reference: Option<&'a str>) -> Self {
        Self {
            topic,
            event,
            payload: serde_json::Map::new(),
            reference,
        }
    }

    fn to_text(&self) -> String {
        // Serialization of a flat frame with string fields cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Options control opcodes.
const OPTIONS_JOIN: u8 = 0x01;
const OPTIONS_LEAVE: u8 = 0x02;

/// Width of an options channel on the wire.
const OPTIONS_CHANNEL_WIDTH: usize = 21;

/// Resolved endpoint and encoding profile for one feed.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    provider: Provider,
    delayed: bool,
    manual_ip: Option<String>,
}

impl ProviderProfile {
    /// Build a profile. `manual_ip` is consulted only for [`Provider::Manual`];
    /// the caller validates its presence.
    #[must_use]
    pub fn new(provider: Provider, delayed: bool, manual_ip: Option<String>) -> Self {
        Self {
            provider,
            delayed,
            manual_ip,
        }
    }

    /// The provider this profile resolves.
    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    /// Decoder branch for this feed.
    #[must_use]
    pub const fn wire_variant(&self) -> WireVariant {
        if self.provider.is_options() {
            WireVariant::Options
        } else {
            WireVariant::Equities
        }
    }

    fn host(&self) -> String {
        match self.provider {
            Provider::Realtime | Provider::Iex => "realtime-mx.intrinio.com".to_string(),
            Provider::DelayedSip => "realtime-delayed-sip.intrinio.com".to_string(),
            Provider::NasdaqBasic => "realtime-nasdaq-basic.intrinio.com".to_string(),
            Provider::CboeOne => "cboe-one.intrinio.com".to_string(),
            Provider::Opra => "realtime-options.intrinio.com".to_string(),
            Provider::Manual => self.manual_ip.clone().unwrap_or_default(),
        }
    }

    /// `Manual` talks plain HTTP/WS to the supplied IP; everything else is TLS.
    const fn is_plaintext(&self) -> bool {
        matches!(self.provider, Provider::Manual)
    }

    /// Token-vendor URL for this feed.
    #[must_use]
    pub fn auth_url(&self, api_key: &str) -> String {
        let scheme = if self.is_plaintext() { "http" } else { "https" };
        format!("{scheme}://{}/auth?api_key={api_key}", self.host())
    }

    /// WebSocket URL for this feed, carrying the short-lived token.
    #[must_use]
    pub fn socket_url(&self, token: &str) -> String {
        let scheme = if self.is_plaintext() { "ws" } else { "wss" };
        let delayed = if self.delayed { "&delayed=true" } else { "" };
        format!(
            "{scheme}://{}/socket/websocket?vsn=1.0.0&token={token}{delayed}",
            self.host()
        )
    }

    /// The keepalive payload the server expects.
    #[must_use]
    pub fn heartbeat_message(&self) -> ControlMessage {
        match self.wire_variant() {
            WireVariant::Equities => ControlMessage::Text(
                PhoenixFrame::new("phoenix", "heartbeat", None).to_text(),
            ),
            WireVariant::Options => ControlMessage::Binary(Vec::new()),
        }
    }

    /// Encode a join for `channel`.
    #[must_use]
    pub fn encode_join(&self, channel: &str) -> ControlMessage {
        match self.wire_variant() {
            WireVariant::Equities => ControlMessage::Text(
                PhoenixFrame::new(channel, "phx_join", Some("1")).to_text(),
            ),
            WireVariant::Options => {
                ControlMessage::Binary(options_control(OPTIONS_JOIN, channel))
            }
        }
    }

    /// Encode a leave for `channel`.
    #[must_use]
    pub fn encode_leave(&self, channel: &str) -> ControlMessage {
        match self.wire_variant() {
            WireVariant::Equities => ControlMessage::Text(
                PhoenixFrame::new(channel, "phx_leave", Some("1")).to_text(),
            ),
            WireVariant::Options => {
                ControlMessage::Binary(options_control(OPTIONS_LEAVE, channel))
            }
        }
    }

    /// Provider-specific spelling of the firehose subscription sentinel.
    #[must_use]
    pub const fn firehose_channel(&self) -> &'static str {
        match self.provider {
            Provider::Realtime => "lobby",
            Provider::Iex | Provider::DelayedSip | Provider::NasdaqBasic => "$lobby",
            Provider::CboeOne => "$lobby_last_price",
            Provider::Opra | Provider::Manual => "$FIREHOSE",
        }
    }
}

/// Options control frame: opcode byte then the channel padded to 21 bytes
/// with `_`. Contracts are already 21 characters; roots and sentinels are
/// shorter and get padded.
fn options_control(opcode: u8, channel: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(1 + OPTIONS_CHANNEL_WIDTH.max(channel.len()));
    message.push(opcode);
    message.extend_from_slice(channel.as_bytes());
    while message.len() < 1 + OPTIONS_CHANNEL_WIDTH {
        message.push(b'_');
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(provider: Provider) -> ProviderProfile {
        ProviderProfile::new(provider, false, None)
    }

    #[test]
    fn auth_urls_per_provider() {
        assert_eq!(
            profile(Provider::Realtime).auth_url("k"),
            "https://realtime-mx.intrinio.com/auth?api_key=k"
        );
        assert_eq!(
            profile(Provider::DelayedSip).auth_url("k"),
            "https://realtime-delayed-sip.intrinio.com/auth?api_key=k"
        );
        assert_eq!(
            profile(Provider::NasdaqBasic).auth_url("k"),
            "https://realtime-nasdaq-basic.intrinio.com/auth?api_key=k"
        );
        assert_eq!(
            profile(Provider::CboeOne).auth_url("k"),
            "https://cboe-one.intrinio.com/auth?api_key=k"
        );
        assert_eq!(
            profile(Provider::Opra).auth_url("k"),
            "https://realtime-options.intrinio.com/auth?api_key=k"
        );
    }

    #[test]
    fn manual_provider_uses_supplied_ip() {
        let profile = ProviderProfile::new(
            Provider::Manual,
            false,
            Some("10.0.0.5:8000".to_string()),
        );
        assert_eq!(profile.auth_url("k"), "http://10.0.0.5:8000/auth?api_key=k");
        assert_eq!(
            profile.socket_url("t"),
            "ws://10.0.0.5:8000/socket/websocket?vsn=1.0.0&token=t"
        );
    }

    #[test]
    fn socket_url_carries_delayed_flag() {
        let profile = ProviderProfile::new(Provider::Realtime, true, None);
        assert_eq!(
            profile.socket_url("tok"),
            "wss://realtime-mx.intrinio.com/socket/websocket?vsn=1.0.0&token=tok&delayed=true"
        );

        let live = ProviderProfile::new(Provider::Realtime, false, None);
        assert!(!live.socket_url("tok").contains("delayed"));
    }

    #[test]
    fn equities_join_is_phoenix_json() {
        let msg = profile(Provider::Realtime).encode_join("AAPL");
        let ControlMessage::Text(json) = msg else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["topic"], "AAPL");
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["payload"], serde_json::json!({}));
        assert_eq!(value["ref"], "1");
    }

    #[test]
    fn equities_leave_is_phoenix_json() {
        let msg = profile(Provider::DelayedSip).encode_leave("MSFT");
        let ControlMessage::Text(json) = msg else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "phx_leave");
        assert_eq!(value["topic"], "MSFT");
    }

    #[test]
    fn equities_heartbeat_payload() {
        let msg = profile(Provider::Realtime).heartbeat_message();
        let ControlMessage::Text(json) = msg else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["topic"], "phoenix");
        assert_eq!(value["event"], "heartbeat");
        assert_eq!(value["ref"], serde_json::Value::Null);
    }

    #[test]
    fn options_heartbeat_is_empty_binary() {
        assert_eq!(
            profile(Provider::Opra).heartbeat_message(),
            ControlMessage::Binary(Vec::new())
        );
    }

    #[test]
    fn options_join_pads_channel_to_width() {
        let msg = profile(Provider::Opra).encode_join("AAPL");
        let ControlMessage::Binary(bytes) = msg else {
            panic!("expected binary frame");
        };
        assert_eq!(bytes.len(), 22);
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..5], b"AAPL");
        assert!(bytes[5..].iter().all(|&b| b == b'_'));
    }

    #[test]
    fn options_firehose_join_uses_sentinel() {
        let profile = profile(Provider::Opra);
        let msg = profile.encode_join(profile.firehose_channel());
        let ControlMessage::Binary(bytes) = msg else {
            panic!("expected binary frame");
        };
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..], b"$FIREHOSE____________");
        assert_eq!(bytes.len() - 1, 21);
    }

    #[test]
    fn options_leave_full_contract() {
        let msg = profile(Provider::Opra).encode_leave("AAPL__230616C00180000");
        let ControlMessage::Binary(bytes) = msg else {
            panic!("expected binary frame");
        };
        assert_eq!(bytes[0], 0x02);
        assert_eq!(&bytes[1..], b"AAPL__230616C00180000");
    }

    #[test]
    fn firehose_spelling_per_provider() {
        assert_eq!(profile(Provider::Realtime).firehose_channel(), "lobby");
        assert_eq!(profile(Provider::Iex).firehose_channel(), "$lobby");
        assert_eq!(profile(Provider::DelayedSip).firehose_channel(), "$lobby");
        assert_eq!(
            profile(Provider::CboeOne).firehose_channel(),
            "$lobby_last_price"
        );
        assert_eq!(profile(Provider::Opra).firehose_channel(), "$FIREHOSE");
    }

    #[test]
    fn wire_variant_split() {
        assert_eq!(profile(Provider::Realtime).wire_variant(), WireVariant::Equities);
        assert_eq!(profile(Provider::CboeOne).wire_variant(), WireVariant::Equities);
        assert_eq!(profile(Provider::Opra).wire_variant(), WireVariant::Options);
        assert_eq!(profile(Provider::Manual).wire_variant(), WireVariant::Options);
    }
}

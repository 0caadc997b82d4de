//! Binary Frame Decoder
//!
//! Decodes inbound WebSocket binary frames into typed market-data events.
//! Frames are multi-message: byte 0 carries the message count, followed by
//! that many back-to-back records. Record layouts differ between the
//! equities and options feeds; see [`equities`] and [`options`].
//!
//! The decoder never panics and never aborts the reader for a bad frame:
//! malformed input yields the events decoded so far plus [`DecodeError`]
//! values that the caller routes to an out-of-band logging channel.
//!
//! All multi-byte integers are little-endian.

pub mod equities;
pub mod options;

use crate::events::StreamEvent;
use crate::provider::WireVariant;

/// How many raw bytes to keep on a decode error for forensic logging.
const ERROR_HEX_PREFIX_LEN: usize = 32;

/// A recoverable protocol error raised while decoding one frame.
///
/// Carries a hex prefix of the offending frame so operators can correlate
/// against captures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    /// A record extended past the end of the frame.
    #[error("frame truncated at offset {offset} while reading {context} (frame {raw_prefix})")]
    Truncated {
        /// Byte offset of the record that overran.
        offset: usize,
        /// What was being read.
        context: &'static str,
        /// Hex prefix of the frame.
        raw_prefix: String,
    },

    /// An equities record carried an unknown type byte. Record length is not
    /// self-describing on the equities wire, so the rest of the frame is
    /// dropped.
    #[error("unknown equities message type {message_type} at offset {offset} (frame {raw_prefix})")]
    UnknownEquitiesType {
        /// The unrecognized type byte.
        message_type: u8,
        /// Byte offset of the record.
        offset: usize,
        /// Hex prefix of the frame.
        raw_prefix: String,
    },

    /// An equities record declared a zero-length symbol.
    #[error("zero-length symbol at offset {offset} (frame {raw_prefix})")]
    EmptySymbol {
        /// Byte offset of the record.
        offset: usize,
        /// Hex prefix of the frame.
        raw_prefix: String,
    },

    /// An options record declared a length too short for its own header.
    #[error("invalid options record length {declared} at offset {offset} (frame {raw_prefix})")]
    BadRecordLength {
        /// The declared `msg_len`.
        declared: u8,
        /// Byte offset of the record.
        offset: usize,
        /// Hex prefix of the frame.
        raw_prefix: String,
    },

    /// An options unusual-activity record carried an unmapped subtype or
    /// sentiment byte. The record is skipped; the frame continues.
    #[error("unmapped unusual-activity code {code} at offset {offset} (frame {raw_prefix})")]
    UnknownActivityCode {
        /// The unmapped byte.
        code: u8,
        /// Byte offset of the record.
        offset: usize,
        /// Hex prefix of the frame.
        raw_prefix: String,
    },
}

/// Result of decoding one frame: the events recovered, in wire order, plus
/// any protocol errors encountered along the way.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// Decoded events in record order.
    pub events: Vec<StreamEvent>,
    /// Protocol errors raised while decoding.
    pub errors: Vec<DecodeError>,
}

/// Decode one binary frame for the given wire variant.
#[must_use]
pub fn decode_frame(variant: WireVariant, frame: &[u8]) -> DecodedFrame {
    match variant {
        WireVariant::Equities => equities::decode(frame),
        WireVariant::Options => options::decode(frame),
    }
}

/// Hex prefix of a frame for forensic logging, truncated to a fixed width.
pub(crate) fn hex_prefix(frame: &[u8]) -> String {
    let take = frame.len().min(ERROR_HEX_PREFIX_LEN);
    let mut out = String::with_capacity(take * 2 + 1);
    for byte in &frame[..take] {
        out.push_str(&format!("{byte:02x}"));
    }
    if frame.len() > take {
        out.push('…');
    }
    out
}

// =============================================================================
// Checked little-endian field readers
// =============================================================================

pub(crate) fn u8_at(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

pub(crate) fn u16_at(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn u32_at(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

pub(crate) fn u64_at(buf: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

pub(crate) fn i32_at(buf: &[u8], offset: usize) -> Option<i32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(i32::from_le_bytes(bytes))
}

pub(crate) fn i64_at(buf: &[u8], offset: usize) -> Option<i64> {
    let bytes: [u8; 8] = buf.get(offset..offset + 8)?.try_into().ok()?;
    Some(i64::from_le_bytes(bytes))
}

pub(crate) fn f32_at(buf: &[u8], offset: usize) -> Option<f32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(f32::from_le_bytes(bytes))
}

//! Equities Record Decoder
//!
//! Record layout (all integers little-endian):
//!
//! ```text
//! type: u8          0 = trade, 1 = ask quote, 2 = bid quote
//! symbol_len: u8
//! symbol: [u8; symbol_len]   ASCII
//! price: f32
//! size: u32
//! timestamp: u64             nanoseconds since epoch
//! total_volume: u32          trades only
//! subprovider: u8
//! market_center: u16         rendered as one character
//! condition: [u8; 8]         ASCII, trailing padding trimmed
//! ```
//!
//! Record length is computed from the declared fields, so an unknown type
//! byte or a zero-length symbol makes the rest of the frame unwalkable and
//! it is dropped.

use super::{DecodeError, DecodedFrame, f32_at, hex_prefix, u8_at, u16_at, u32_at, u64_at};
use crate::events::{EquitiesQuote, EquitiesTrade, QuoteSide, StreamEvent, SubProvider};

const TYPE_TRADE: u8 = 0;
const TYPE_ASK: u8 = 1;
const TYPE_BID: u8 = 2;

/// Fixed bytes after the symbol in a trade record:
/// price + size + timestamp + total_volume + subprovider + market_center + condition.
const TRADE_TAIL: usize = 4 + 4 + 8 + 4 + 1 + 2 + 8;
/// Fixed bytes after the symbol in a quote record (no total_volume).
const QUOTE_TAIL: usize = 4 + 4 + 8 + 1 + 2 + 8;

/// Byte length of one record, given its header.
pub(crate) fn record_len(message_type: u8, symbol_len: u8) -> Option<usize> {
    let tail = match message_type {
        TYPE_TRADE => TRADE_TAIL,
        TYPE_ASK | TYPE_BID => QUOTE_TAIL,
        _ => return None,
    };
    Some(2 + symbol_len as usize + tail)
}

/// Decode one equities frame: count byte then `count` records.
pub(crate) fn decode(frame: &[u8]) -> DecodedFrame {
    let mut decoded = DecodedFrame::default();

    let Some(count) = u8_at(frame, 0) else {
        return decoded;
    };

    let mut offset = 1usize;
    for _ in 0..count {
        match decode_record(frame, offset) {
            Ok((event, next)) => {
                decoded.events.push(event);
                offset = next;
            }
            Err(error) => {
                // Length is not self-describing; nothing after a bad record
                // can be trusted.
                decoded.errors.push(error);
                break;
            }
        }
    }

    decoded
}

fn decode_record(frame: &[u8], offset: usize) -> Result<(StreamEvent, usize), DecodeError> {
    let message_type = u8_at(frame, offset).ok_or_else(|| DecodeError::Truncated {
        offset,
        context: "record header",
        raw_prefix: hex_prefix(frame),
    })?;
    let symbol_len = u8_at(frame, offset + 1).ok_or_else(|| DecodeError::Truncated {
        offset,
        context: "record header",
        raw_prefix: hex_prefix(frame),
    })?;

    if symbol_len == 0 {
        return Err(DecodeError::EmptySymbol {
            offset,
            raw_prefix: hex_prefix(frame),
        });
    }

    let len = record_len(message_type, symbol_len).ok_or(DecodeError::UnknownEquitiesType {
        message_type,
        offset,
        raw_prefix: hex_prefix(frame),
    })?;

    if offset + len > frame.len() {
        return Err(DecodeError::Truncated {
            offset,
            context: "record body",
            raw_prefix: hex_prefix(frame),
        });
    }

    let symbol_end = offset + 2 + symbol_len as usize;
    let symbol = String::from_utf8_lossy(&frame[offset + 2..symbol_end]).into_owned();

    // Field reads below are bounds-guaranteed by the length check above.
    let truncated = || DecodeError::Truncated {
        offset,
        context: "record body",
        raw_prefix: hex_prefix(frame),
    };

    let price = f64::from(f32_at(frame, symbol_end).ok_or_else(truncated)?);
    let size = u32_at(frame, symbol_end + 4).ok_or_else(truncated)?;
    let timestamp = u64_at(frame, symbol_end + 8).ok_or_else(truncated)?;

    let event = if message_type == TYPE_TRADE {
        let total_volume = u32_at(frame, symbol_end + 16).ok_or_else(truncated)?;
        let subprovider = SubProvider::from_wire(u8_at(frame, symbol_end + 20).ok_or_else(truncated)?);
        let market_center = market_center(u16_at(frame, symbol_end + 21).ok_or_else(truncated)?);
        let condition = condition(&frame[symbol_end + 23..symbol_end + 31]);
        StreamEvent::EquitiesTrade(EquitiesTrade {
            symbol,
            price,
            size,
            total_volume,
            timestamp,
            subprovider,
            market_center,
            condition,
        })
    } else {
        let subprovider = SubProvider::from_wire(u8_at(frame, symbol_end + 16).ok_or_else(truncated)?);
        let market_center = market_center(u16_at(frame, symbol_end + 17).ok_or_else(truncated)?);
        let condition = condition(&frame[symbol_end + 19..symbol_end + 27]);
        let side = if message_type == TYPE_ASK {
            QuoteSide::Ask
        } else {
            QuoteSide::Bid
        };
        StreamEvent::EquitiesQuote(EquitiesQuote {
            symbol,
            side,
            price,
            size,
            timestamp,
            subprovider,
            market_center,
            condition,
        })
    };

    Ok((event, offset + len))
}

fn market_center(wire: u16) -> char {
    char::from_u32(u32::from(wire)).unwrap_or('\0')
}

fn condition(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\0', ' '])
        .to_string()
}

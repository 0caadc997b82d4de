//! Options Record Decoder
//!
//! Records are self-describing (all integers little-endian):
//!
//! ```text
//! type: u8          1 = trade, 2 = quote, 3 = refresh, 4 = unusual activity
//! msg_len: u8       total record length including these two bytes
//! contract: [u8; 21]   OPRA identifier, left-padded root with '_'
//! ...type-specific fields...
//! ```
//!
//! Prices arrive as fixed-point integers scaled by 10 000 and decode to
//! IEEE-754 doubles; the sentinel `i32::MIN` / `i64::MIN` decodes to `NaN`.
//! Timestamps arrive as microseconds since the epoch and decode to float
//! seconds. Unknown record types are skipped via `msg_len`.

use super::{
    DecodeError, DecodedFrame, hex_prefix, i32_at, i64_at, u8_at, u32_at, u64_at,
};
use crate::events::{
    OptionsExchange, OptionsQuote, OptionsRefresh, OptionsTrade, OptionsUnusualActivity,
    StreamEvent, UnusualActivitySentiment, UnusualActivityType,
};

const TYPE_TRADE: u8 = 1;
const TYPE_QUOTE: u8 = 2;
const TYPE_REFRESH: u8 = 3;
const TYPE_UNUSUAL_ACTIVITY: u8 = 4;

const CONTRACT_LEN: usize = 21;
/// Offset of the first type-specific field within a record.
const BODY: usize = 2 + CONTRACT_LEN;

/// Declared lengths for each known record type.
pub(crate) const TRADE_MSG_LEN: u8 = 68;
pub(crate) const QUOTE_MSG_LEN: u8 = 47;
pub(crate) const REFRESH_MSG_LEN: u8 = 43;
pub(crate) const UNUSUAL_ACTIVITY_MSG_LEN: u8 = 65;

const FIXED_POINT_SCALE: f64 = 10_000.0;
const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Minimum record length for a type, or `None` for unknown types.
fn required_len(message_type: u8) -> Option<u8> {
    match message_type {
        TYPE_TRADE => Some(TRADE_MSG_LEN),
        TYPE_QUOTE => Some(QUOTE_MSG_LEN),
        TYPE_REFRESH => Some(REFRESH_MSG_LEN),
        TYPE_UNUSUAL_ACTIVITY => Some(UNUSUAL_ACTIVITY_MSG_LEN),
        _ => None,
    }
}

/// Fixed-point price scaled by 10 000; `i32::MIN` is the NaN sentinel.
fn price4(wire: i32) -> f64 {
    if wire == i32::MIN {
        f64::NAN
    } else {
        f64::from(wire) / FIXED_POINT_SCALE
    }
}

/// Fixed-point value scaled by 10 000; `i64::MIN` is the NaN sentinel.
fn price8(wire: i64) -> f64 {
    if wire == i64::MIN {
        f64::NAN
    } else {
        #[allow(clippy::cast_precision_loss)]
        let value = wire as f64;
        value / FIXED_POINT_SCALE
    }
}

/// Microseconds since epoch to float seconds.
fn seconds(micros: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let value = micros as f64;
    value / MICROS_PER_SECOND
}

/// Decode one options frame: count byte then `count` records.
pub(crate) fn decode(frame: &[u8]) -> DecodedFrame {
    let mut decoded = DecodedFrame::default();

    let Some(count) = u8_at(frame, 0) else {
        return decoded;
    };

    let mut offset = 1usize;
    for _ in 0..count {
        let Some(message_type) = u8_at(frame, offset) else {
            decoded.errors.push(DecodeError::Truncated {
                offset,
                context: "record header",
                raw_prefix: hex_prefix(frame),
            });
            break;
        };
        let Some(msg_len) = u8_at(frame, offset + 1) else {
            decoded.errors.push(DecodeError::Truncated {
                offset,
                context: "record header",
                raw_prefix: hex_prefix(frame),
            });
            break;
        };

        if (msg_len as usize) < 2 {
            decoded.errors.push(DecodeError::BadRecordLength {
                declared: msg_len,
                offset,
                raw_prefix: hex_prefix(frame),
            });
            break;
        }

        let end = offset + msg_len as usize;
        if end > frame.len() {
            decoded.errors.push(DecodeError::Truncated {
                offset,
                context: "record body",
                raw_prefix: hex_prefix(frame),
            });
            break;
        }

        match required_len(message_type) {
            None => {
                // Unknown type: msg_len tells us how far to skip.
                offset = end;
                continue;
            }
            Some(required) if msg_len < required => {
                decoded.errors.push(DecodeError::BadRecordLength {
                    declared: msg_len,
                    offset,
                    raw_prefix: hex_prefix(frame),
                });
                break;
            }
            Some(_) => {}
        }

        let record = &frame[offset..end];
        match decode_record(message_type, record) {
            Ok(event) => decoded.events.push(event),
            Err(code) => {
                decoded.errors.push(DecodeError::UnknownActivityCode {
                    code,
                    offset,
                    raw_prefix: hex_prefix(frame),
                });
            }
        }
        offset = end;
    }

    decoded
}

/// Decode one bounds-checked record. Returns the unmapped byte on an
/// unknown unusual-activity code.
fn decode_record(message_type: u8, record: &[u8]) -> Result<StreamEvent, u8> {
    let contract = String::from_utf8_lossy(&record[2..2 + CONTRACT_LEN]).into_owned();

    // Offsets are guaranteed by the msg_len check in `decode`; the readers
    // still return Option, so collapse misses to defaults that cannot occur.
    let event = match message_type {
        TYPE_TRADE => StreamEvent::OptionsTrade(OptionsTrade {
            contract,
            exchange: OptionsExchange::from_wire(u8_at(record, BODY).unwrap_or(0)),
            price: price4(i32_at(record, BODY + 1).unwrap_or(i32::MIN)),
            size: u32_at(record, BODY + 5).unwrap_or(0),
            timestamp: seconds(u64_at(record, BODY + 9).unwrap_or(0)),
            total_volume: u64_at(record, BODY + 17).unwrap_or(0),
            qualifiers: [
                u8_at(record, BODY + 25).unwrap_or(0),
                u8_at(record, BODY + 26).unwrap_or(0),
                u8_at(record, BODY + 27).unwrap_or(0),
                u8_at(record, BODY + 28).unwrap_or(0),
            ],
            ask_price_at_execution: price4(i32_at(record, BODY + 29).unwrap_or(i32::MIN)),
            bid_price_at_execution: price4(i32_at(record, BODY + 33).unwrap_or(i32::MIN)),
            underlying_price_at_execution: price8(i64_at(record, BODY + 37).unwrap_or(i64::MIN)),
        }),
        TYPE_QUOTE => StreamEvent::OptionsQuote(OptionsQuote {
            contract,
            ask_price: price4(i32_at(record, BODY).unwrap_or(i32::MIN)),
            ask_size: u32_at(record, BODY + 4).unwrap_or(0),
            bid_price: price4(i32_at(record, BODY + 8).unwrap_or(i32::MIN)),
            bid_size: u32_at(record, BODY + 12).unwrap_or(0),
            timestamp: seconds(u64_at(record, BODY + 16).unwrap_or(0)),
        }),
        TYPE_REFRESH => StreamEvent::OptionsRefresh(OptionsRefresh {
            contract,
            open_interest: u32_at(record, BODY).unwrap_or(0),
            open_price: price4(i32_at(record, BODY + 4).unwrap_or(i32::MIN)),
            close_price: price4(i32_at(record, BODY + 8).unwrap_or(i32::MIN)),
            high_price: price4(i32_at(record, BODY + 12).unwrap_or(i32::MIN)),
            low_price: price4(i32_at(record, BODY + 16).unwrap_or(i32::MIN)),
        }),
        TYPE_UNUSUAL_ACTIVITY => {
            let subtype = u8_at(record, BODY).unwrap_or(u8::MAX);
            let sentiment_code = u8_at(record, BODY + 1).unwrap_or(u8::MAX);
            let activity_type = UnusualActivityType::from_wire(subtype).ok_or(subtype)?;
            let sentiment =
                UnusualActivitySentiment::from_wire(sentiment_code).ok_or(sentiment_code)?;
            StreamEvent::OptionsUnusualActivity(OptionsUnusualActivity {
                contract,
                activity_type,
                sentiment,
                total_value: price8(i64_at(record, BODY + 2).unwrap_or(i64::MIN)),
                total_size: u32_at(record, BODY + 10).unwrap_or(0),
                average_price: price4(i32_at(record, BODY + 14).unwrap_or(i32::MIN)),
                ask_price_at_execution: price4(i32_at(record, BODY + 18).unwrap_or(i32::MIN)),
                bid_price_at_execution: price4(i32_at(record, BODY + 22).unwrap_or(i32::MIN)),
                underlying_price_at_execution: price8(
                    i64_at(record, BODY + 26).unwrap_or(i64::MIN),
                ),
                timestamp: seconds(u64_at(record, BODY + 30).unwrap_or(0)),
            })
        }
        // `decode` only dispatches known types.
        _ => return Err(message_type),
    };

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad_contract(contract: &str) -> [u8; CONTRACT_LEN] {
        let mut out = [b'_'; CONTRACT_LEN];
        out[..contract.len()].copy_from_slice(contract.as_bytes());
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_trade(
        contract: &str,
        exchange: u8,
        price: i32,
        size: u32,
        timestamp_us: u64,
        total_volume: u64,
        qualifiers: [u8; 4],
        ask: i32,
        bid: i32,
        underlying: i64,
    ) -> Vec<u8> {
        let mut buf = vec![TYPE_TRADE, TRADE_MSG_LEN];
        buf.extend_from_slice(&pad_contract(contract));
        buf.push(exchange);
        buf.extend_from_slice(&price.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&timestamp_us.to_le_bytes());
        buf.extend_from_slice(&total_volume.to_le_bytes());
        buf.extend_from_slice(&qualifiers);
        buf.extend_from_slice(&ask.to_le_bytes());
        buf.extend_from_slice(&bid.to_le_bytes());
        buf.extend_from_slice(&underlying.to_le_bytes());
        assert_eq!(buf.len(), TRADE_MSG_LEN as usize);
        buf
    }

    fn encode_quote(
        contract: &str,
        ask: i32,
        ask_size: u32,
        bid: i32,
        bid_size: u32,
        timestamp_us: u64,
    ) -> Vec<u8> {
        let mut buf = vec![TYPE_QUOTE, QUOTE_MSG_LEN];
        buf.extend_from_slice(&pad_contract(contract));
        buf.extend_from_slice(&ask.to_le_bytes());
        buf.extend_from_slice(&ask_size.to_le_bytes());
        buf.extend_from_slice(&bid.to_le_bytes());
        buf.extend_from_slice(&bid_size.to_le_bytes());
        buf.extend_from_slice(&timestamp_us.to_le_bytes());
        assert_eq!(buf.len(), QUOTE_MSG_LEN as usize);
        buf
    }

    fn encode_refresh(
        contract: &str,
        open_interest: u32,
        open: i32,
        close: i32,
        high: i32,
        low: i32,
    ) -> Vec<u8> {
        let mut buf = vec![TYPE_REFRESH, REFRESH_MSG_LEN];
        buf.extend_from_slice(&pad_contract(contract));
        buf.extend_from_slice(&open_interest.to_le_bytes());
        buf.extend_from_slice(&open.to_le_bytes());
        buf.extend_from_slice(&close.to_le_bytes());
        buf.extend_from_slice(&high.to_le_bytes());
        buf.extend_from_slice(&low.to_le_bytes());
        assert_eq!(buf.len(), REFRESH_MSG_LEN as usize);
        buf
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_unusual_activity(
        contract: &str,
        subtype: u8,
        sentiment: u8,
        total_value: i64,
        total_size: u32,
        average_price: i32,
        ask: i32,
        bid: i32,
        underlying: i64,
        timestamp_us: u64,
    ) -> Vec<u8> {
        let mut buf = vec![TYPE_UNUSUAL_ACTIVITY, UNUSUAL_ACTIVITY_MSG_LEN];
        buf.extend_from_slice(&pad_contract(contract));
        buf.push(subtype);
        buf.push(sentiment);
        buf.extend_from_slice(&total_value.to_le_bytes());
        buf.extend_from_slice(&total_size.to_le_bytes());
        buf.extend_from_slice(&average_price.to_le_bytes());
        buf.extend_from_slice(&ask.to_le_bytes());
        buf.extend_from_slice(&bid.to_le_bytes());
        buf.extend_from_slice(&underlying.to_le_bytes());
        buf.extend_from_slice(&timestamp_us.to_le_bytes());
        assert_eq!(buf.len(), UNUSUAL_ACTIVITY_MSG_LEN as usize);
        buf
    }

    fn frame(records: &[Vec<u8>]) -> Vec<u8> {
        let mut buf = vec![u8::try_from(records.len()).unwrap()];
        for record in records {
            buf.extend_from_slice(record);
        }
        buf
    }

    #[test]
    fn trade_roundtrip() {
        let record = encode_trade(
            "AAPL__230616C00180000",
            b'C',
            1_502_500,
            10,
            1_700_000_000_000_000,
            5_000,
            [1, 2, 3, 4],
            1_503_000,
            1_502_000,
            1_851_200,
        );
        let decoded = decode(&frame(&[record]));
        assert!(decoded.errors.is_empty());

        let StreamEvent::OptionsTrade(trade) = &decoded.events[0] else {
            panic!("expected trade");
        };
        assert_eq!(trade.contract, "AAPL__230616C00180000");
        assert_eq!(trade.exchange, OptionsExchange::Cboe);
        assert!((trade.price - 150.25).abs() < 1e-9);
        assert_eq!(trade.size, 10);
        assert!((trade.timestamp - 1_700_000_000.0).abs() < 1e-9);
        assert_eq!(trade.total_volume, 5_000);
        assert_eq!(trade.qualifiers, [1, 2, 3, 4]);
        assert!((trade.ask_price_at_execution - 150.30).abs() < 1e-9);
        assert!((trade.bid_price_at_execution - 150.20).abs() < 1e-9);
        assert!((trade.underlying_price_at_execution - 185.12).abs() < 1e-9);
    }

    #[test]
    fn quote_roundtrip() {
        let record = encode_quote(
            "AAPL__230616C00180000",
            1_500_000,
            10,
            1_490_000,
            12,
            1_700_000_000_000_000,
        );
        let decoded = decode(&frame(&[record]));
        assert!(decoded.errors.is_empty());

        let StreamEvent::OptionsQuote(quote) = &decoded.events[0] else {
            panic!("expected quote");
        };
        assert_eq!(quote.contract, "AAPL__230616C00180000");
        assert!((quote.ask_price - 150.0).abs() < 1e-9);
        assert_eq!(quote.ask_size, 10);
        assert!((quote.bid_price - 149.0).abs() < 1e-9);
        assert_eq!(quote.bid_size, 12);
        // 1.7e15 us on the wire is 1.7e9 seconds.
        assert!((quote.timestamp - 1.7e9).abs() < 1e-6);
    }

    #[test]
    fn refresh_roundtrip() {
        let record = encode_refresh("SPY___240119P00450000", 9_999, 10_000, 20_000, 35_000, 5_000);
        let decoded = decode(&frame(&[record]));
        assert!(decoded.errors.is_empty());

        let StreamEvent::OptionsRefresh(refresh) = &decoded.events[0] else {
            panic!("expected refresh");
        };
        assert_eq!(refresh.open_interest, 9_999);
        assert!((refresh.open_price - 1.0).abs() < 1e-9);
        assert!((refresh.close_price - 2.0).abs() < 1e-9);
        assert!((refresh.high_price - 3.5).abs() < 1e-9);
        assert!((refresh.low_price - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unusual_activity_roundtrip() {
        let record = encode_unusual_activity(
            "TSLA__240119C00250000",
            1,
            2,
            12_500_000,
            250,
            50_000,
            50_500,
            49_500,
            2_450_000,
            1_700_000_123_456_789,
        );
        let decoded = decode(&frame(&[record]));
        assert!(decoded.errors.is_empty());

        let StreamEvent::OptionsUnusualActivity(ua) = &decoded.events[0] else {
            panic!("expected unusual activity");
        };
        assert_eq!(ua.activity_type, UnusualActivityType::Sweep);
        assert_eq!(ua.sentiment, UnusualActivitySentiment::Bearish);
        assert!((ua.total_value - 1_250.0).abs() < 1e-9);
        assert_eq!(ua.total_size, 250);
        assert!((ua.average_price - 5.0).abs() < 1e-9);
        assert!((ua.underlying_price_at_execution - 245.0).abs() < 1e-9);
        assert!((ua.timestamp - 1_700_000_123.456_789).abs() < 1e-6);
    }

    #[test]
    fn nan_sentinels() {
        let record = encode_quote("AAPL__230616C00180000", i32::MIN, 0, i32::MIN, 0, 1);
        let decoded = decode(&frame(&[record]));
        let StreamEvent::OptionsQuote(quote) = &decoded.events[0] else {
            panic!("expected quote");
        };
        assert!(quote.ask_price.is_nan());
        assert!(quote.bid_price.is_nan());

        let record = encode_trade(
            "AAPL__230616C00180000",
            b'N',
            100,
            1,
            1,
            1,
            [0; 4],
            100,
            100,
            i64::MIN,
        );
        let decoded = decode(&frame(&[record]));
        let StreamEvent::OptionsTrade(trade) = &decoded.events[0] else {
            panic!("expected trade");
        };
        assert!(trade.underlying_price_at_execution.is_nan());
    }

    #[test]
    fn unknown_type_is_skipped_by_declared_length() {
        // An unknown record type sandwiched between two quotes: the decoder
        // must hop over it and keep going.
        let q1 = encode_quote("AAPL__230616C00180000", 1, 1, 1, 1, 1);
        let mut unknown = vec![9u8, 7];
        unknown.extend_from_slice(&[0xAA; 5]);
        let q2 = encode_quote("AAPL__230616C00180000", 2, 2, 2, 2, 2);

        let mut buf = vec![3u8];
        buf.extend_from_slice(&q1);
        buf.extend_from_slice(&unknown);
        buf.extend_from_slice(&q2);

        let decoded = decode(&buf);
        assert_eq!(decoded.events.len(), 2);
        assert!(decoded.errors.is_empty());
    }

    #[test]
    fn truncated_record_yields_partial_events() {
        let q1 = encode_quote("AAPL__230616C00180000", 1, 1, 1, 1, 1);
        let q2 = encode_quote("AAPL__230616C00180000", 2, 2, 2, 2, 2);
        let mut buf = frame(&[q1, q2]);
        buf.truncate(buf.len() - 10);

        let decoded = decode(&buf);
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.errors.len(), 1);
        assert!(matches!(decoded.errors[0], DecodeError::Truncated { .. }));
    }

    #[test]
    fn undersized_declared_length_drops_frame() {
        let mut record = encode_quote("AAPL__230616C00180000", 1, 1, 1, 1, 1);
        record[1] = QUOTE_MSG_LEN - 1;
        record.truncate(usize::from(QUOTE_MSG_LEN) - 1);
        let decoded = decode(&frame(&[record]));
        assert!(decoded.events.is_empty());
        assert_eq!(decoded.errors.len(), 1);
        assert!(matches!(
            decoded.errors[0],
            DecodeError::BadRecordLength { .. }
        ));
    }

    #[test]
    fn unmapped_activity_code_skips_record_only() {
        let bad = encode_unusual_activity(
            "TSLA__240119C00250000",
            200,
            0,
            1,
            1,
            1,
            1,
            1,
            1,
            1,
        );
        let good = encode_quote("AAPL__230616C00180000", 1, 1, 1, 1, 1);
        let decoded = decode(&frame(&[bad, good]));
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.errors.len(), 1);
        assert!(matches!(
            decoded.errors[0],
            DecodeError::UnknownActivityCode { code: 200, .. }
        ));
    }

    #[test]
    fn contract_pad_is_returned_verbatim() {
        let record = encode_quote("GE____240119C00015000", 1, 1, 1, 1, 1);
        let decoded = decode(&frame(&[record]));
        let StreamEvent::OptionsQuote(quote) = &decoded.events[0] else {
            panic!("expected quote");
        };
        assert_eq!(quote.contract.len(), 21);
        assert!(quote.contract.starts_with("GE____"));
    }
}

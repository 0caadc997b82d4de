//! Replay CSV Sink
//!
//! Optional flat-file dump of every replayed event, one row per event.
//!
//! Schema (header row): `type,symbol,price,size,timestamp,extra1,extra2,extra3,extra4`
//!
//! | event | price | size | extra1 | extra2 | extra3 | extra4 |
//! |---|---|---|---|---|---|---|
//! | equities trade | trade price | trade size | subprovider | market center | condition | total volume |
//! | equities quote (`ask`/`bid`) | quote price | quote size | subprovider | market center | condition | |
//! | options trade | trade price | trade size | underlying | ask at exec | bid at exec | qualifiers, quoted `a\|b\|c\|d` |
//! | options quote | ask price | ask size | bid price | bid size | | |
//! | options refresh | close | open interest | open | high | low | |
//! | options unusual activity | average price | total size | underlying | ask at exec | bid at exec | total value |

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::events::StreamEvent;

const HEADER: &str = "type,symbol,price,size,timestamp,extra1,extra2,extra3,extra4";

/// Shared append-only CSV writer. Workers serialize on the inner mutex.
pub(crate) struct CsvSink {
    writer: Mutex<BufWriter<File>>,
}

impl CsvSink {
    /// Create (truncate) the file and write the header row.
    pub(crate) fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{HEADER}")?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    /// Append one row for a decoded event. Raw (bypass-parsing) events have
    /// no row representation and are skipped.
    pub(crate) fn write_event(&self, event: &StreamEvent) -> std::io::Result<()> {
        let row = match event {
            StreamEvent::EquitiesTrade(t) => format!(
                "trade,{},{},{},{},{},{},{},{}",
                t.symbol,
                t.price,
                t.size,
                t.timestamp,
                t.subprovider.as_str(),
                t.market_center,
                t.condition,
                t.total_volume,
            ),
            StreamEvent::EquitiesQuote(q) => format!(
                "{},{},{},{},{},{},{},{},",
                q.side.as_str(),
                q.symbol,
                q.price,
                q.size,
                q.timestamp,
                q.subprovider.as_str(),
                q.market_center,
                q.condition,
            ),
            StreamEvent::OptionsTrade(t) => format!(
                "trade,{},{},{},{},{},{},{},\"{}|{}|{}|{}\"",
                t.contract,
                t.price,
                t.size,
                t.timestamp,
                t.underlying_price_at_execution,
                t.ask_price_at_execution,
                t.bid_price_at_execution,
                t.qualifiers[0],
                t.qualifiers[1],
                t.qualifiers[2],
                t.qualifiers[3],
            ),
            StreamEvent::OptionsQuote(q) => format!(
                "quote,{},{},{},{},{},{},,",
                q.contract, q.ask_price, q.ask_size, q.timestamp, q.bid_price, q.bid_size,
            ),
            StreamEvent::OptionsRefresh(r) => format!(
                "refresh,{},{},{},,{},{},{},",
                r.contract, r.close_price, r.open_interest, r.open_price, r.high_price, r.low_price,
            ),
            StreamEvent::OptionsUnusualActivity(ua) => format!(
                "{},{},{},{},{},{},{},{},{}",
                ua.activity_type.as_str(),
                ua.contract,
                ua.average_price,
                ua.total_size,
                ua.timestamp,
                ua.underlying_price_at_execution,
                ua.ask_price_at_execution,
                ua.bid_price_at_execution,
                ua.total_value,
            ),
            StreamEvent::Raw(_) => return Ok(()),
        };

        let mut writer = self.writer.lock();
        writeln!(writer, "{row}")
    }

    /// Flush buffered rows to disk.
    pub(crate) fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

//! Market Data Event Types
//!
//! Typed events produced by the frame decoder. Equities events carry the
//! SIP-style fields (sub-provider, market center, sale condition); options
//! events carry the OPRA contract identifier plus execution context.
//!
//! # Contract format
//!
//! Options contracts use the 21-character OPRA identifier: a 6-character
//! root padded with `_`, a 6-character `YYMMDD` expiry, `C` or `P`, and an
//! 8-character strike scaled by 1000. Example: `AAPL__230616C00180000`.
//! Contracts are returned verbatim from the wire, trailing pad included.

use bytes::Bytes;

// =============================================================================
// Equities
// =============================================================================

/// Granular source tag within an equities provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubProvider {
    /// No sub-provider tagged on the message.
    NoSubProvider,
    /// CTA tape A.
    CtaA,
    /// CTA tape B.
    CtaB,
    /// UTP (tape C).
    Utp,
    /// OTC markets.
    Otc,
    /// Nasdaq Basic.
    NasdaqBasic,
    /// IEX.
    Iex,
    /// Cboe One.
    CboeOne,
}

impl SubProvider {
    /// Map a wire code to a sub-provider. Unknown codes fall back to IEX,
    /// matching historical feed behavior.
    #[must_use]
    pub const fn from_wire(code: u8) -> Self {
        match code {
            0 => Self::NoSubProvider,
            1 => Self::CtaA,
            2 => Self::CtaB,
            3 => Self::Utp,
            4 => Self::Otc,
            5 => Self::NasdaqBasic,
            7 => Self::CboeOne,
            _ => Self::Iex,
        }
    }

    /// Stable name used in logs and CSV output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoSubProvider => "NO_SUBPROVIDER",
            Self::CtaA => "CTA_A",
            Self::CtaB => "CTA_B",
            Self::Utp => "UTP",
            Self::Otc => "OTC",
            Self::NasdaqBasic => "NASDAQ_BASIC",
            Self::Iex => "IEX",
            Self::CboeOne => "CBOE_ONE",
        }
    }
}

/// Side of an equities quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSide {
    /// Ask (offer) side.
    Ask,
    /// Bid side.
    Bid,
}

impl QuoteSide {
    /// Lowercase name used in CSV output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Bid => "bid",
        }
    }
}

/// A completed equities trade print.
#[derive(Debug, Clone, PartialEq)]
pub struct EquitiesTrade {
    /// Ticker symbol, e.g. `AAPL`.
    pub symbol: String,
    /// Trade price in USD.
    pub price: f64,
    /// Trade size in shares.
    pub size: u32,
    /// Running total volume for the symbol on this session.
    pub total_volume: u32,
    /// Event timestamp, nanoseconds since the Unix epoch.
    pub timestamp: u64,
    /// Source tape within the provider.
    pub subprovider: SubProvider,
    /// Market center code (single character).
    pub market_center: char,
    /// Sale condition, trailing padding trimmed. May be empty.
    pub condition: String,
}

impl EquitiesTrade {
    /// Whether this print came from a dark pool or off-exchange venue.
    ///
    /// SIP tapes mark dark prints with market center `D`/`E` (or blank);
    /// Nasdaq Basic uses `L`/`2`.
    #[must_use]
    pub fn is_darkpool(&self) -> bool {
        match self.subprovider {
            SubProvider::CtaA | SubProvider::CtaB | SubProvider::Otc | SubProvider::Utp => {
                matches!(self.market_center, 'D' | 'E' | '\0' | ' ')
            }
            SubProvider::NasdaqBasic => matches!(self.market_center, 'L' | '2' | '\0' | ' '),
            _ => false,
        }
    }
}

/// One side of an equities NBBO update.
#[derive(Debug, Clone, PartialEq)]
pub struct EquitiesQuote {
    /// Ticker symbol.
    pub symbol: String,
    /// Ask or bid.
    pub side: QuoteSide,
    /// Quoted price in USD.
    pub price: f64,
    /// Quoted size in shares.
    pub size: u32,
    /// Event timestamp, nanoseconds since the Unix epoch.
    pub timestamp: u64,
    /// Source tape within the provider.
    pub subprovider: SubProvider,
    /// Market center code (single character).
    pub market_center: char,
    /// Quote condition, trailing padding trimmed. May be empty.
    pub condition: String,
}

// =============================================================================
// Options
// =============================================================================

/// OPRA participant exchange, keyed by the single-letter wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsExchange {
    /// NYSE American (A).
    NyseAmerican,
    /// BOX (B).
    Boston,
    /// Cboe (C).
    Cboe,
    /// MIAX Emerald (D).
    MiamiEmerald,
    /// Cboe EDGX (E).
    BatsEdgx,
    /// Nasdaq GEMX (H).
    IseGemini,
    /// Nasdaq ISE (I).
    Ise,
    /// Nasdaq MRX (J).
    Mercury,
    /// MIAX (M).
    Miami,
    /// NYSE Arca (N).
    NyseArca,
    /// MIAX Pearl (O).
    MiamiPearl,
    /// NYSE Arca legacy code (P).
    NyseArcaDeprecated,
    /// Nasdaq PHLX legacy code (Q).
    Nasdaq,
    /// MIAX Sapphire (S).
    MiaxSapphire,
    /// Nasdaq BX (T).
    NasdaqBx,
    /// MEMX (U).
    Memx,
    /// Cboe C2 (W).
    CboeC2,
    /// Nasdaq PHLX (X).
    Phlx,
    /// Cboe BZX (Z).
    BatsBzx,
    /// Unrecognized code.
    Unknown,
}

impl OptionsExchange {
    /// Map a wire byte (ASCII exchange letter) to an exchange.
    #[must_use]
    pub const fn from_wire(code: u8) -> Self {
        match code {
            b'A' => Self::NyseAmerican,
            b'B' => Self::Boston,
            b'C' => Self::Cboe,
            b'D' => Self::MiamiEmerald,
            b'E' => Self::BatsEdgx,
            b'H' => Self::IseGemini,
            b'I' => Self::Ise,
            b'J' => Self::Mercury,
            b'M' => Self::Miami,
            b'N' => Self::NyseArca,
            b'O' => Self::MiamiPearl,
            b'P' => Self::NyseArcaDeprecated,
            b'Q' => Self::Nasdaq,
            b'S' => Self::MiaxSapphire,
            b'T' => Self::NasdaqBx,
            b'U' => Self::Memx,
            b'W' => Self::CboeC2,
            b'X' => Self::Phlx,
            b'Z' => Self::BatsBzx,
            _ => Self::Unknown,
        }
    }
}

/// Vendor classification of an unusual-activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusualActivityType {
    /// Single large block execution.
    Block,
    /// Multi-exchange sweep.
    Sweep,
    /// Large print relative to typical size.
    Large,
    /// Sweep flagged as unusual.
    UnusualSweep,
}

impl UnusualActivityType {
    /// Map a wire subtype byte; `None` for unrecognized values.
    #[must_use]
    pub const fn from_wire(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Block),
            1 => Some(Self::Sweep),
            2 => Some(Self::Large),
            3 => Some(Self::UnusualSweep),
            _ => None,
        }
    }

    /// Stable name used in logs and CSV output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "BLOCK",
            Self::Sweep => "SWEEP",
            Self::Large => "LARGE",
            Self::UnusualSweep => "UNUSUAL_SWEEP",
        }
    }
}

/// Vendor sentiment attached to an unusual-activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusualActivitySentiment {
    /// No directional read.
    Neutral,
    /// Bullish.
    Bullish,
    /// Bearish.
    Bearish,
}

impl UnusualActivitySentiment {
    /// Map a wire sentiment byte; `None` for unrecognized values.
    #[must_use]
    pub const fn from_wire(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Neutral),
            1 => Some(Self::Bullish),
            2 => Some(Self::Bearish),
            _ => None,
        }
    }

    /// Stable name used in logs and CSV output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "NEUTRAL",
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
        }
    }
}

/// A completed options trade print.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsTrade {
    /// 21-character OPRA contract identifier.
    pub contract: String,
    /// Executing exchange.
    pub exchange: OptionsExchange,
    /// Trade price in USD.
    pub price: f64,
    /// Trade size in contracts.
    pub size: u32,
    /// Event timestamp, seconds since the Unix epoch (microsecond precision).
    pub timestamp: f64,
    /// Running total volume for the contract on this session.
    pub total_volume: u64,
    /// OPRA trade qualifier bytes.
    pub qualifiers: [u8; 4],
    /// Best ask at execution time.
    pub ask_price_at_execution: f64,
    /// Best bid at execution time.
    pub bid_price_at_execution: f64,
    /// Underlying security price at execution time.
    pub underlying_price_at_execution: f64,
}

/// An options NBBO update.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsQuote {
    /// 21-character OPRA contract identifier.
    pub contract: String,
    /// Best ask price in USD.
    pub ask_price: f64,
    /// Ask size in contracts.
    pub ask_size: u32,
    /// Best bid price in USD.
    pub bid_price: f64,
    /// Bid size in contracts.
    pub bid_size: u32,
    /// Event timestamp, seconds since the Unix epoch (microsecond precision).
    pub timestamp: f64,
}

/// Periodic open-interest and OHLC snapshot for a contract. Not a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsRefresh {
    /// 21-character OPRA contract identifier.
    pub contract: String,
    /// Open interest in contracts.
    pub open_interest: u32,
    /// Session open price.
    pub open_price: f64,
    /// Prior close price.
    pub close_price: f64,
    /// Session high price.
    pub high_price: f64,
    /// Session low price.
    pub low_price: f64,
}

/// A vendor-detected unusual-activity event (block/sweep/large print).
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsUnusualActivity {
    /// 21-character OPRA contract identifier.
    pub contract: String,
    /// Activity classification.
    pub activity_type: UnusualActivityType,
    /// Vendor sentiment.
    pub sentiment: UnusualActivitySentiment,
    /// Aggregate notional value in USD.
    pub total_value: f64,
    /// Aggregate size in contracts.
    pub total_size: u32,
    /// Size-weighted average execution price.
    pub average_price: f64,
    /// Best ask at execution time.
    pub ask_price_at_execution: f64,
    /// Best bid at execution time.
    pub bid_price_at_execution: f64,
    /// Underlying security price at execution time.
    pub underlying_price_at_execution: f64,
    /// Event timestamp, seconds since the Unix epoch (microsecond precision).
    pub timestamp: f64,
}

// =============================================================================
// Contract helpers
// =============================================================================

/// Underlying root of a 21-character contract, pad characters stripped.
#[must_use]
pub fn contract_underlying(contract: &str) -> &str {
    let root = contract.get(0..6).unwrap_or(contract);
    root.trim_end_matches('_')
}

/// Whether a contract is a call.
#[must_use]
pub fn contract_is_call(contract: &str) -> bool {
    contract.as_bytes().get(12) == Some(&b'C')
}

/// Whether a contract is a put.
#[must_use]
pub fn contract_is_put(contract: &str) -> bool {
    contract.as_bytes().get(12) == Some(&b'P')
}

/// Expiry of a contract as `YYMMDD`, if well-formed.
#[must_use]
pub fn contract_expiry(contract: &str) -> Option<&str> {
    contract.get(6..12)
}

/// Strike price of a 21-character contract.
///
/// The last eight characters encode the strike scaled by 1000.
#[must_use]
pub fn contract_strike_price(contract: &str) -> Option<f64> {
    let digits = contract.get(13..21)?;
    let scaled: u64 = digits.parse().ok()?;
    #[allow(clippy::cast_precision_loss)]
    Some(scaled as f64 / 1000.0)
}

macro_rules! contract_accessors {
    ($ty:ty) => {
        impl $ty {
            /// Underlying root symbol, pad characters stripped.
            #[must_use]
            pub fn underlying_symbol(&self) -> &str {
                contract_underlying(&self.contract)
            }

            /// Whether the contract is a call.
            #[must_use]
            pub fn is_call(&self) -> bool {
                contract_is_call(&self.contract)
            }

            /// Whether the contract is a put.
            #[must_use]
            pub fn is_put(&self) -> bool {
                contract_is_put(&self.contract)
            }

            /// Strike price in USD, if the contract is well-formed.
            #[must_use]
            pub fn strike_price(&self) -> Option<f64> {
                contract_strike_price(&self.contract)
            }
        }
    };
}

contract_accessors!(OptionsTrade);
contract_accessors!(OptionsQuote);
contract_accessors!(OptionsRefresh);
contract_accessors!(OptionsUnusualActivity);

// =============================================================================
// Unified event
// =============================================================================

/// A trade from either wire variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Trade {
    /// Equities trade.
    Equities(EquitiesTrade),
    /// Options trade.
    Options(OptionsTrade),
}

/// A quote from either wire variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Quote {
    /// Equities quote (one side of the NBBO).
    Equities(EquitiesQuote),
    /// Options quote (both sides).
    Options(OptionsQuote),
}

/// Any decoded market-data event, as produced by the frame decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Equities trade print.
    EquitiesTrade(EquitiesTrade),
    /// Equities quote update.
    EquitiesQuote(EquitiesQuote),
    /// Options trade print.
    OptionsTrade(OptionsTrade),
    /// Options quote update.
    OptionsQuote(OptionsQuote),
    /// Options open-interest/OHLC snapshot.
    OptionsRefresh(OptionsRefresh),
    /// Options unusual-activity event.
    OptionsUnusualActivity(OptionsUnusualActivity),
    /// Undecoded frame bytes, emitted when parsing is bypassed.
    Raw(Bytes),
}

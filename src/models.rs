//! Common data model shared by the adapters, the aggregator and the
//! notification scheduler.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One exchange's current funding state for a single perpetual instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingQuote {
    /// Exchange display name ("Binance", "Bybit", ...).
    pub exchange: &'static str,
    /// Instrument identifier in the exchange's native format
    /// (e.g. "BTCUSDT", "BTC_USDT", "XBTUSDTM").
    pub symbol: String,
    /// Funding rate as a signed fraction: 0.001 == 0.1%. Not clamped.
    pub rate: f64,
    /// Last/mark/index price, whichever the exchange reports.
    pub price: Option<f64>,
    /// Absolute time of the next funding settlement, if known or estimated.
    pub next_settlement: Option<DateTime<Utc>>,
    /// True iff `next_settlement` was filled in by the 8-hour-boundary
    /// heuristic rather than reported by the exchange. Callers must never
    /// treat an estimated time as exact.
    pub settlement_estimated: bool,
}

impl FundingQuote {
    /// Two quotes refer to the same instrument when both exchange and
    /// native symbol match.
    pub fn same_instrument(&self, other: &FundingQuote) -> bool {
        self.exchange == other.exchange && self.symbol == other.symbol
    }
}

/// The highest-vs-lowest funding rate pair for one base asset, the unit
/// the aggregator ranks and the scheduler evaluates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSpread {
    /// Normalized underlying symbol, e.g. "BTC".
    pub base_asset: String,
    /// Quote with the maximum funding rate in this group.
    pub high: FundingQuote,
    /// Quote with the minimum funding rate in this group.
    pub low: FundingQuote,
    /// `(high.rate - low.rate) * 100`, always > 0 for emitted spreads.
    pub spread_pct: f64,
}

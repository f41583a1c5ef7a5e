//! Multi-exchange aggregation.
//!
//! Fans out to every registered adapter concurrently, tolerates
//! individual adapter failure, normalizes exchange-native symbols to a
//! base asset and ranks the largest funding-rate spread per asset.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};

use crate::exchanges::ExchangeAdapter;
use crate::models::{AssetSpread, FundingQuote};

/// Ceiling on how long one aggregation round waits for any adapter.
/// Adapters still running past it count as failed for the round.
pub const FETCH_CEILING: Duration = Duration::from_secs(30);

pub struct Aggregator {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    fetch_ceiling: Duration,
}

impl Aggregator {
    pub fn new(adapters: Vec<Arc<dyn ExchangeAdapter>>) -> Self {
        Self {
            adapters,
            fetch_ceiling: FETCH_CEILING,
        }
    }

    /// Override the per-round fetch ceiling (tests use short ceilings).
    pub fn with_fetch_ceiling(mut self, ceiling: Duration) -> Self {
        self.fetch_ceiling = ceiling;
        self
    }

    /// Fetch all adapters and return the top `n` cross-exchange spreads,
    /// best first. Total inability to reach any exchange yields an empty
    /// vec, never an error: callers treat empty as "no data this round".
    pub async fn top_spreads(&self, n: usize) -> Vec<AssetSpread> {
        let pool = self.fetch_all().await;
        if pool.is_empty() {
            return Vec::new();
        }

        let mut by_base: HashMap<String, Vec<FundingQuote>> = HashMap::new();
        for quote in pool {
            let base = base_asset(quote.exchange, &quote.symbol);
            by_base.entry(base).or_default().push(quote);
        }

        let mut spreads: Vec<AssetSpread> = Vec::new();
        for (base, quotes) in by_base {
            if let Some(spread) = spread_for_group(base, &quotes) {
                spreads.push(spread);
            }
        }

        // Descending by spread; ties keep discovery order.
        spreads.sort_by(|a, b| {
            b.spread_pct
                .partial_cmp(&a.spread_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        spreads.truncate(n.max(1));
        spreads
    }

    /// Concurrent fan-out over all adapters, joined with the round
    /// ceiling. A failed or timed-out adapter degrades to an empty
    /// result and is logged, never aborting the others.
    async fn fetch_all(&self) -> Vec<FundingQuote> {
        let tasks = self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let ceiling = self.fetch_ceiling;
            async move {
                match tokio::time::timeout(ceiling, adapter.fetch()).await {
                    Ok(Ok(quotes)) => {
                        debug!("{}: {} quotes", adapter.name(), quotes.len());
                        quotes
                    }
                    Ok(Err(err)) => {
                        warn!("{} fetch failed: {}", adapter.name(), err);
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(
                            "{} fetch exceeded the {:?} ceiling",
                            adapter.name(),
                            ceiling
                        );
                        Vec::new()
                    }
                }
            }
        });

        join_all(tasks).await.into_iter().flatten().collect()
    }
}

/// High/low pair for one base-asset group. Requires at least two quotes,
/// a strictly positive spread and two distinct instruments; otherwise
/// the group produces nothing to rank.
fn spread_for_group(base: String, quotes: &[FundingQuote]) -> Option<AssetSpread> {
    if quotes.len() < 2 {
        return None;
    }
    let high = quotes
        .iter()
        .max_by(|a, b| a.rate.partial_cmp(&b.rate).unwrap_or(std::cmp::Ordering::Equal))?;
    let low = quotes
        .iter()
        .min_by(|a, b| a.rate.partial_cmp(&b.rate).unwrap_or(std::cmp::Ordering::Equal))?;
    // Exact IEEE comparison, no epsilon: equal max and min means no spread.
    if high.rate == low.rate || high.same_instrument(low) {
        return None;
    }
    Some(AssetSpread {
        base_asset: base,
        spread_pct: (high.rate - low.rate) * 100.0,
        high: high.clone(),
        low: low.clone(),
    })
}

/// Normalize an exchange-native symbol to its base asset.
///
/// Per-exchange rules: Gate.io uses the separator form ("BTC_USDT"),
/// Bitget appends a product suffix after an underscore
/// ("BTCUSDT_UMCBL"), KuCoin uses a futures suffix ("BTCUSDTM"), and
/// Binance/Bybit use the plain quote-currency suffix ("BTCUSDT"). When
/// no rule applies the remaining separators are stripped.
pub fn base_asset(exchange: &str, symbol: &str) -> String {
    let symbol = symbol.to_uppercase();
    match exchange {
        "Gate.io" => {
            if let Some((base, _)) = symbol.split_once('_') {
                return base.to_string();
            }
        }
        "Bitget" => {
            let head = symbol.split('_').next().unwrap_or(&symbol);
            if let Some(base) = head.strip_suffix("USDT") {
                return base.to_string();
            }
        }
        "KuCoin" => {
            if let Some(base) = symbol.strip_suffix("USDTM") {
                return base.to_string();
            }
        }
        _ => {
            if let Some(base) = symbol.strip_suffix("USDT") {
                return base.to_string();
            }
        }
    }
    symbol.replace(['-', '_'], "")
}

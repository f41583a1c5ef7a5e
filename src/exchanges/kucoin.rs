//! KuCoin futures adapter.
//!
//! KuCoin staggers its funding cycle by four hours (04/12/20 UTC), so
//! estimated settlement times use a +4h offset. This offset matters for
//! alert timing and must not be changed casually.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{field_f64, field_millis, get_json, with_estimated_settlement, ExchangeAdapter};
use crate::error::FetchResult;
use crate::models::FundingQuote;

const ENDPOINT: &str = "https://api-futures.kucoin.com/api/v1/contracts/active";

/// Hour offset of KuCoin's 8-hour funding cycle relative to 00:00 UTC.
const FUNDING_CYCLE_OFFSET_HOURS: i64 = 4;

pub struct KuCoin {
    client: Client,
}

impl KuCoin {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map the active-contracts list. USDT-margined contracts carry a
/// `USDTM` suffix (e.g. "XBTUSDTM").
fn parse(body: &Value) -> Vec<FundingQuote> {
    let data = body.get("data");
    let mut quotes = Vec::new();
    for node in data.and_then(Value::as_array).into_iter().flatten() {
        let symbol = node.get("symbol").and_then(|s| s.as_str()).unwrap_or("");
        if !symbol.ends_with("USDTM") {
            continue;
        }
        let Some(rate) = field_f64(node, "fundingFeeRate") else {
            continue;
        };
        let quote = FundingQuote {
            exchange: "KuCoin",
            symbol: symbol.to_string(),
            rate,
            price: field_f64(node, "indexPrice"),
            next_settlement: field_millis(node, "fundingNextApply"),
            settlement_estimated: false,
        };
        quotes.push(with_estimated_settlement(quote, FUNDING_CYCLE_OFFSET_HOURS));
    }
    quotes
}

#[async_trait]
impl ExchangeAdapter for KuCoin {
    fn name(&self) -> &'static str {
        "KuCoin"
    }

    async fn fetch(&self) -> FetchResult<Vec<FundingQuote>> {
        let body = get_json(&self.client, ENDPOINT).await?;
        Ok(parse(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn keeps_only_usdtm_contracts() {
        let body = serde_json::json!({
            "data": [
                {"symbol": "XBTUSDTM", "fundingFeeRate": 0.0001, "indexPrice": 64000.0},
                {"symbol": "XBTUSDM", "fundingFeeRate": 0.0002},
                {"symbol": "ETHUSDTM"}
            ]
        });

        let quotes = parse(&body);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "XBTUSDTM");
        assert_eq!(quotes[0].rate, 0.0001);
    }

    #[test]
    fn estimated_settlement_lands_on_staggered_boundary() {
        let body = serde_json::json!({
            "data": [{"symbol": "XBTUSDTM", "fundingFeeRate": 0.0001}]
        });
        let quotes = parse(&body);
        assert!(quotes[0].settlement_estimated);
        let hour = quotes[0].next_settlement.unwrap().hour();
        assert!(matches!(hour, 4 | 12 | 20), "unexpected hour {hour}");
    }
}

//! Binance USDT-margined futures adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{field_f64, field_millis, get_json, with_estimated_settlement, ExchangeAdapter};
use crate::error::FetchResult;
use crate::models::FundingQuote;

const ENDPOINT: &str = "https://fapi.binance.com/fapi/v1/premiumIndex";

pub struct Binance {
    client: Client,
}

impl Binance {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map the `premiumIndex` array. Rows without a parseable funding rate
/// or outside the USDT-margined universe are dropped.
fn parse(body: &Value) -> Vec<FundingQuote> {
    let mut quotes = Vec::new();
    for node in body.as_array().into_iter().flatten() {
        let symbol = node.get("symbol").and_then(|s| s.as_str()).unwrap_or("");
        if !symbol.ends_with("USDT") {
            continue;
        }
        let Some(rate) = field_f64(node, "lastFundingRate") else {
            continue;
        };
        let quote = FundingQuote {
            exchange: "Binance",
            symbol: symbol.to_string(),
            rate,
            price: field_f64(node, "markPrice"),
            next_settlement: field_millis(node, "nextFundingTime"),
            settlement_estimated: false,
        };
        quotes.push(with_estimated_settlement(quote, 0));
    }
    quotes
}

#[async_trait]
impl ExchangeAdapter for Binance {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn fetch(&self) -> FetchResult<Vec<FundingQuote>> {
        let body = get_json(&self.client, ENDPOINT).await?;
        Ok(parse(&body))
    }
}

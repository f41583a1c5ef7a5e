//! Bybit linear-perpetuals adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{field_f64, field_millis, get_json, with_estimated_settlement, ExchangeAdapter};
use crate::error::FetchResult;
use crate::models::FundingQuote;

const ENDPOINT: &str = "https://api.bybit.com/v5/market/tickers?category=linear";

pub struct Bybit {
    client: Client,
}

impl Bybit {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map `result.list` of the v5 tickers response. Bybit reports
/// `nextFundingTime` as either a number or a numeric string depending on
/// the instrument.
fn parse(body: &Value) -> Vec<FundingQuote> {
    let list = body.pointer("/result/list");
    let mut quotes = Vec::new();
    for node in list.and_then(Value::as_array).into_iter().flatten() {
        let symbol = node.get("symbol").and_then(|s| s.as_str()).unwrap_or("");
        if !symbol.ends_with("USDT") {
            continue;
        }
        let Some(rate) = field_f64(node, "fundingRate") else {
            continue;
        };
        let quote = FundingQuote {
            exchange: "Bybit",
            symbol: symbol.to_string(),
            rate,
            price: field_f64(node, "lastPrice"),
            next_settlement: field_millis(node, "nextFundingTime"),
            settlement_estimated: false,
        };
        quotes.push(with_estimated_settlement(quote, 0));
    }
    quotes
}

#[async_trait]
impl ExchangeAdapter for Bybit {
    fn name(&self) -> &'static str {
        "Bybit"
    }

    async fn fetch(&self) -> FetchResult<Vec<FundingQuote>> {
        let body = get_json(&self.client, ENDPOINT).await?;
        Ok(parse(&body))
    }
}

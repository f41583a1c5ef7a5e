//! Bitget USDT-margined futures adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{field_f64, field_millis, get_json, with_estimated_settlement, ExchangeAdapter};
use crate::error::FetchResult;
use crate::models::FundingQuote;

const ENDPOINT: &str = "https://api.bitget.com/api/mix/v1/market/tickers?productType=umcbl";

pub struct Bitget {
    client: Client,
}

impl Bitget {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map the umcbl (USDT-margined) ticker list. The price field name has
/// changed across API revisions, so `last` falls back to `lastPrice`.
fn parse(body: &Value) -> Vec<FundingQuote> {
    let data = body.get("data");
    let mut quotes = Vec::new();
    for node in data.and_then(Value::as_array).into_iter().flatten() {
        let symbol = node.get("symbol").and_then(|s| s.as_str()).unwrap_or("");
        if symbol.is_empty() {
            continue;
        }
        let Some(rate) = field_f64(node, "fundingRate") else {
            continue;
        };
        let price = field_f64(node, "last").or_else(|| field_f64(node, "lastPrice"));
        let quote = FundingQuote {
            exchange: "Bitget",
            symbol: symbol.to_string(),
            rate,
            price,
            next_settlement: field_millis(node, "nextFundingTime"),
            settlement_estimated: false,
        };
        quotes.push(with_estimated_settlement(quote, 0));
    }
    quotes
}

#[async_trait]
impl ExchangeAdapter for Bitget {
    fn name(&self) -> &'static str {
        "Bitget"
    }

    async fn fetch(&self) -> FetchResult<Vec<FundingQuote>> {
        let body = get_json(&self.client, ENDPOINT).await?;
        Ok(parse(&body))
    }
}

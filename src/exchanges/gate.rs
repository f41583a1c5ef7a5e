//! Gate.io USDT futures adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{field_f64, field_seconds, get_json, with_estimated_settlement, ExchangeAdapter};
use crate::error::FetchResult;
use crate::models::FundingQuote;

const ENDPOINT: &str = "https://api.gateio.ws/api/v4/futures/usdt/tickers";

pub struct Gate {
    client: Client,
}

impl Gate {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map the USDT-futures ticker array. Contract names use the separator
/// form ("BTC_USDT"); the endpoint is already USDT-margined only.
fn parse(body: &Value) -> Vec<FundingQuote> {
    let mut quotes = Vec::new();
    for node in body.as_array().into_iter().flatten() {
        let symbol = node.get("contract").and_then(|s| s.as_str()).unwrap_or("");
        if symbol.is_empty() {
            continue;
        }
        let Some(rate) = field_f64(node, "funding_rate") else {
            continue;
        };
        let quote = FundingQuote {
            exchange: "Gate.io",
            symbol: symbol.to_string(),
            rate,
            price: field_f64(node, "last"),
            // Unlike the millisecond timestamps elsewhere, Gate reports
            // unix seconds here.
            next_settlement: field_seconds(node, "funding_next_apply"),
            settlement_estimated: false,
        };
        quotes.push(with_estimated_settlement(quote, 0));
    }
    quotes
}

#[async_trait]
impl ExchangeAdapter for Gate {
    fn name(&self) -> &'static str {
        "Gate.io"
    }

    async fn fetch(&self) -> FetchResult<Vec<FundingQuote>> {
        let body = get_json(&self.client, ENDPOINT).await?;
        Ok(parse(&body))
    }
}

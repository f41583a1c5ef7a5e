//! Exchange adapters.
//!
//! Each adapter issues one bounded-time GET against its exchange's public
//! ticker/funding endpoint, parses the exchange-specific JSON shape and
//! maps every USDT-margined perpetual to a [`FundingQuote`]. Individual
//! records with missing or unparsable fields are dropped silently; only
//! transport-level problems surface as a [`FetchError`], and even those
//! are contained per adapter by the aggregator.

mod binance;
mod bitget;
mod bybit;
mod gate;
mod kucoin;

pub use binance::Binance;
pub use bitget::Bitget;
pub use bybit::Bybit;
pub use gate::Gate;
pub use kucoin::KuCoin;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Timelike, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::error::{FetchError, FetchResult};
use crate::models::FundingQuote;

/// Connect timeout for the shared HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for exchange endpoints.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// One exchange's funding-data source.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Exchange display name.
    fn name(&self) -> &'static str;

    /// Fetch the current funding state of every eligible instrument.
    async fn fetch(&self) -> FetchResult<Vec<FundingQuote>>;
}

/// Shared HTTP client for all adapters. Stateless and safely reentrant.
pub fn http_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent("funding-spread-bot/0.1")
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// The default adapter registry, one entry per supported exchange.
pub fn default_adapters() -> Vec<Arc<dyn ExchangeAdapter>> {
    let client = http_client();
    vec![
        Arc::new(Binance::new(client.clone())),
        Arc::new(Bybit::new(client.clone())),
        Arc::new(KuCoin::new(client.clone())),
        Arc::new(Gate::new(client.clone())),
        Arc::new(Bitget::new(client)),
    ]
}

/// GET a JSON document, mapping non-2xx responses to [`FetchError::Status`].
pub(crate) async fn get_json(client: &Client, url: &str) -> FetchResult<Value> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            code: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.json::<Value>().await?)
}

/// Read a numeric field that exchanges report either as a JSON number or
/// as a numeric string. Missing, null or unparsable values yield `None`.
pub(crate) fn field_f64(node: &Value, key: &str) -> Option<f64> {
    match node.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a millisecond-epoch field (number or numeric string) as a UTC time.
pub(crate) fn field_millis(node: &Value, key: &str) -> Option<DateTime<Utc>> {
    let millis = match node.get(key)? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp_millis(millis)
}

/// Read a second-epoch field (number or numeric string) as a UTC time.
/// Gate.io reports `funding_next_apply` in unix seconds.
pub(crate) fn field_seconds(node: &Value, key: &str) -> Option<DateTime<Utc>> {
    let secs = match node.get(key)? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

/// Nearest future boundary of the 8-hour funding cycle, offset by an
/// exchange-specific hour offset. Most exchanges settle at 00/08/16 UTC
/// (offset 0); KuCoin staggers its cycle to 04/12/20 UTC (offset 4).
pub(crate) fn next_eight_hour_boundary(now: DateTime<Utc>, offset_hours: i64) -> DateTime<Utc> {
    let hour = i64::from(now.hour());
    let mut add = (8 - (hour - offset_hours).rem_euclid(8)) % 8;
    if add == 0 {
        add = 8;
    }
    let top_of_hour = now
        .duration_trunc(ChronoDuration::hours(1))
        .unwrap_or(now);
    top_of_hour + ChronoDuration::hours(add)
}

/// Fill in an estimated settlement time when the exchange did not report
/// one, marking the quote as estimated.
pub(crate) fn with_estimated_settlement(mut quote: FundingQuote, offset_hours: i64) -> FundingQuote {
    if quote.next_settlement.is_none() {
        quote.next_settlement = Some(next_eight_hour_boundary(Utc::now(), offset_hours));
        quote.settlement_estimated = true;
    }
    quote
}

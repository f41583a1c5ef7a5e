//! Error types for exchange fetching and the Telegram transport.

use thiserror::Error;

/// Result type for adapter fetches.
pub type FetchResult<T> = Result<T, FetchError>;

/// Failure of a single adapter's fetch. These never cross the
/// aggregation boundary; the aggregator degrades a failed adapter to an
/// empty result and logs it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http status {code} for {url}")]
    Status { code: u16, url: String },

    #[error("unexpected response body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for Telegram operations.
pub type TelegramResult<T> = Result<T, TelegramError>;

/// Errors from the Telegram Bot API transport.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram api error: {description}")]
    Api { description: String },

    #[error("malformed telegram response: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelegramError {
    pub fn api(description: impl Into<String>) -> Self {
        TelegramError::Api {
            description: description.into(),
        }
    }
}

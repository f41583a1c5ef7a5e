//! Telegram Bot API client.
//!
//! Talks to the Bot API directly over HTTP: sending/editing/pinning
//! messages, answering callback queries and long-polling for updates.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{TelegramError, TelegramResult};

/// Long-poll timeout requested from `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 25;

pub struct TelegramClient {
    http: Client,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(bot_token: String) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            // Must exceed the long-poll timeout.
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, bot_token }
    }

    fn url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Send an HTML-formatted message, optionally with an inline
    /// keyboard. Returns the new message id.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> TelegramResult<i64> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = markup;
        }
        let result = self.call("sendMessage", payload).await?;
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| TelegramError::api("sendMessage result without message_id"))
    }

    /// Edit an existing message in place (used by the refresh button).
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> TelegramResult<()> {
        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = markup;
        }
        self.call("editMessageText", payload).await?;
        Ok(())
    }

    pub async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "disable_notification": true,
        });
        self.call("pinChatMessage", payload).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> TelegramResult<()> {
        let payload = json!({ "callback_query_id": callback_query_id });
        self.call("answerCallbackQuery", payload).await?;
        Ok(())
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(&self, offset: i64) -> TelegramResult<Vec<Value>> {
        let payload = json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        let result = self.call("getUpdates", payload).await?;
        match result {
            Value::Array(updates) => Ok(updates),
            other => Err(TelegramError::api(format!(
                "getUpdates returned non-array result: {other}"
            ))),
        }
    }

    /// POST one Bot API method and unwrap the `result` field of the
    /// standard `{ok, result, description}` envelope.
    async fn call(&self, method: &str, payload: Value) -> TelegramResult<Value> {
        let response = self
            .http
            .post(self.url(method))
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        let envelope: Value = serde_json::from_str(&body)?;

        if !status.is_success() || envelope.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = envelope
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or(&body);
            return Err(TelegramError::api(format!("{method}: {description}")));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}

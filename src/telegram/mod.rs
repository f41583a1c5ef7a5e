//! Telegram presentation layer: Bot API client, command dispatch and
//! HTML rendering. The core hands this layer string payloads and alert
//! events; message size limits, markup and transport retries stay here.

pub mod client;
pub mod commands;
pub mod format;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::AssetSpread;
use crate::scheduler::AlertSink;
use client::TelegramClient;

/// Delivery collaborator backed by the Bot API: renders an alert and
/// sends it to the subscriber's chat.
pub struct TelegramNotifier {
    client: Arc<TelegramClient>,
}

impl TelegramNotifier {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AlertSink for TelegramNotifier {
    async fn deliver(
        &self,
        chat_id: i64,
        spread: &AssetSpread,
        eta_minutes: i64,
    ) -> anyhow::Result<()> {
        let text = format::render_alert(spread, eta_minutes, Utc::now());
        self.client.send_message(chat_id, &text, None).await?;
        Ok(())
    }
}

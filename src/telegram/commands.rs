//! Command parsing and update dispatch.
//!
//! Parses user directives at this boundary; malformed numeric input gets
//! a one-line usage hint and never reaches the scheduler.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;

use super::client::TelegramClient;
use super::format;
use crate::aggregator::Aggregator;
use crate::scheduler::{NotificationScheduler, NotifyPolicy};

/// Default report size for `/top` without an argument.
const DEFAULT_TOP_N: usize = 10;
/// Default threshold for `/alerts on` without an argument.
const DEFAULT_ALERT_THRESHOLD_PCT: f64 = 1.0;

// Replies go out with HTML parse mode; placeholders must be entity-escaped
// or the Bot API rejects the message as an unsupported tag.
const NOTIFY_USAGE: &str =
    "Usage: /notify &lt;window_min&gt; &lt;threshold_pct&gt; &lt;interval_min&gt;";
const ALERTS_USAGE: &str = "Usage: /alerts on [threshold_pct] | /alerts off";
const TOP_USAGE: &str = "Usage: /top [n]";

const WELCOME: &str = "👋 <b>Funding spread bot</b>\n\n\
Tracks perpetual funding rates across Binance, Bybit, KuCoin, Gate.io \
and Bitget, and alerts ahead of settlement.\n\n\
Commands:\n\
/top [n] — largest cross-exchange spreads right now\n\
/notify &lt;window_min&gt; &lt;threshold_pct&gt; &lt;interval_min&gt; — recurring check\n\
/alerts on [threshold_pct] — precise pre-settlement alerts\n\
/alerts off — disable precise alerts\n\
/stop — stop all notifications";

/// A parsed user directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Top { n: usize },
    Notify(NotifyPolicy),
    AlertsOn { threshold_pct: f64 },
    AlertsOff,
    Stop,
    /// Recognized command with malformed arguments; reply with the hint.
    Usage(&'static str),
    Unknown,
}

/// Parse one message text. Non-command text returns `None`.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    if !head.starts_with('/') {
        return None;
    }
    // Group chats may address the bot as /cmd@botname.
    let name = head[1..].split('@').next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    let command = match name {
        "start" => Command::Start,
        "top" => match args.first() {
            None => Command::Top { n: DEFAULT_TOP_N },
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => Command::Top { n },
                Err(_) => Command::Usage(TOP_USAGE),
            },
        },
        "notify" => parse_notify(&args),
        "alerts" => parse_alerts(&args),
        "stop" => Command::Stop,
        _ => Command::Unknown,
    };
    Some(command)
}

fn parse_notify(args: &[&str]) -> Command {
    let [window, threshold, interval] = args else {
        return Command::Usage(NOTIFY_USAGE);
    };
    let (Ok(window_minutes), Ok(threshold_pct), Ok(interval_minutes)) = (
        window.parse::<i64>(),
        threshold.parse::<f64>(),
        interval.parse::<u64>(),
    ) else {
        return Command::Usage(NOTIFY_USAGE);
    };
    if window_minutes <= 0 || interval_minutes == 0 || !threshold_pct.is_finite() {
        return Command::Usage(NOTIFY_USAGE);
    }
    Command::Notify(NotifyPolicy {
        window_minutes,
        threshold_pct,
        interval_minutes,
    })
}

fn parse_alerts(args: &[&str]) -> Command {
    match args {
        ["on"] => Command::AlertsOn {
            threshold_pct: DEFAULT_ALERT_THRESHOLD_PCT,
        },
        ["on", raw] => match raw.parse::<f64>() {
            Ok(threshold_pct) if threshold_pct.is_finite() => {
                Command::AlertsOn { threshold_pct }
            }
            _ => Command::Usage(ALERTS_USAGE),
        },
        ["off"] => Command::AlertsOff,
        _ => Command::Usage(ALERTS_USAGE),
    }
}

/// Long-poll dispatcher: reads updates and routes parsed commands to the
/// aggregator and scheduler.
pub struct BotDispatcher {
    client: Arc<TelegramClient>,
    aggregator: Arc<Aggregator>,
    scheduler: Arc<NotificationScheduler>,
}

impl BotDispatcher {
    pub fn new(
        client: Arc<TelegramClient>,
        aggregator: Arc<Aggregator>,
        scheduler: Arc<NotificationScheduler>,
    ) -> Self {
        Self {
            client,
            aggregator,
            scheduler,
        }
    }

    /// Run the update loop forever. Transport errors are logged and the
    /// loop backs off briefly; it never exits on its own.
    pub async fn run(&self) {
        let mut offset = 0_i64;
        loop {
            match self.client.get_updates(offset).await {
                Ok(updates) => {
                    for update in &updates {
                        if let Some(id) = update.get("update_id").and_then(Value::as_i64) {
                            offset = offset.max(id + 1);
                        }
                        self.handle_update(update).await;
                    }
                }
                Err(err) => {
                    error!("getUpdates failed: {err}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn handle_update(&self, update: &Value) {
        if let Some(message) = update.get("message") {
            let chat_id = message.pointer("/chat/id").and_then(Value::as_i64);
            let text = message.get("text").and_then(Value::as_str);
            if let (Some(chat_id), Some(text)) = (chat_id, text) {
                self.handle_message(chat_id, text).await;
            }
        } else if let Some(query) = update.get("callback_query") {
            self.handle_callback(query).await;
        }
    }

    async fn handle_message(&self, chat_id: i64, text: &str) {
        let Some(command) = parse_command(text) else {
            return;
        };
        debug!("chat {chat_id}: {command:?}");
        match command {
            Command::Start => self.send_welcome(chat_id).await,
            Command::Top { n } => self.send_report(chat_id, n).await,
            Command::Notify(policy) => {
                self.scheduler.start_recurring(chat_id, policy).await;
                self.reply(
                    chat_id,
                    &format!(
                        "🔔 Recurring check on: spread ≥ {:.2}%, settlement within {} min, every {} min.",
                        policy.threshold_pct, policy.window_minutes, policy.interval_minutes
                    ),
                )
                .await;
            }
            Command::AlertsOn { threshold_pct } => {
                self.scheduler.enable_precise(chat_id, threshold_pct).await;
                self.reply(
                    chat_id,
                    &format!(
                        "🎯 Precise alerts on: spread ≥ {threshold_pct:.2}%, fired ~30 min before settlement."
                    ),
                )
                .await;
            }
            Command::AlertsOff | Command::Stop => {
                self.scheduler.stop(chat_id).await;
                self.reply(chat_id, "🔕 Notifications off.").await;
            }
            Command::Usage(hint) => self.reply(chat_id, hint).await,
            Command::Unknown => {
                self.reply(chat_id, "Unknown command. See /start for the command list.")
                    .await
            }
        }
    }

    /// Refresh button: rebuild the report with the same top-N parameter
    /// and edit the original message in place.
    async fn handle_callback(&self, query: &Value) {
        let query_id = query.get("id").and_then(Value::as_str).unwrap_or("");
        if let Err(err) = self.client.answer_callback_query(query_id).await {
            warn!("answerCallbackQuery failed: {err}");
        }

        let Some(n) = query
            .get("data")
            .and_then(Value::as_str)
            .and_then(|data| data.strip_prefix("top:"))
            .and_then(|raw| raw.parse::<usize>().ok())
        else {
            return;
        };
        let chat_id = query.pointer("/message/chat/id").and_then(Value::as_i64);
        let message_id = query.pointer("/message/message_id").and_then(Value::as_i64);
        let (Some(chat_id), Some(message_id)) = (chat_id, message_id) else {
            return;
        };

        let spreads = self.aggregator.top_spreads(n).await;
        let text = format::render_report(&spreads, Utc::now());
        if let Err(err) = self
            .client
            .edit_message_text(chat_id, message_id, &text, Some(format::refresh_keyboard(n)))
            .await
        {
            warn!("chat {chat_id}: report refresh failed: {err}");
        }
    }

    async fn send_welcome(&self, chat_id: i64) {
        match self.client.send_message(chat_id, WELCOME, None).await {
            Ok(message_id) => {
                if let Err(err) = self.client.pin_chat_message(chat_id, message_id).await {
                    // Pinning needs admin rights in groups; not fatal.
                    debug!("chat {chat_id}: pin failed: {err}");
                }
            }
            Err(err) => warn!("chat {chat_id}: welcome failed: {err}"),
        }
    }

    async fn send_report(&self, chat_id: i64, n: usize) {
        info!("chat {chat_id}: report requested (top {n})");
        let spreads = self.aggregator.top_spreads(n).await;
        let text = format::render_report(&spreads, Utc::now());
        if let Err(err) = self
            .client
            .send_message(chat_id, &text, Some(format::refresh_keyboard(n)))
            .await
        {
            warn!("chat {chat_id}: report send failed: {err}");
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(err) = self.client.send_message(chat_id, text, None).await {
            warn!("chat {chat_id}: reply failed: {err}");
        }
    }
}

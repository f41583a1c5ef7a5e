//! Runtime configuration from the environment.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN is not set")?;
        Ok(Self { bot_token })
    }
}

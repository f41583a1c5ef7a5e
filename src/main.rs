use std::sync::Arc;

use log::info;

use funding_spread_bot::aggregator::Aggregator;
use funding_spread_bot::config::BotConfig;
use funding_spread_bot::exchanges;
use funding_spread_bot::scheduler::NotificationScheduler;
use funding_spread_bot::telegram::client::TelegramClient;
use funding_spread_bot::telegram::commands::BotDispatcher;
use funding_spread_bot::telegram::TelegramNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BotConfig::from_env()?;
    let client = Arc::new(TelegramClient::new(config.bot_token));
    let aggregator = Arc::new(Aggregator::new(exchanges::default_adapters()));
    let notifier = Arc::new(TelegramNotifier::new(Arc::clone(&client)));
    let scheduler = NotificationScheduler::new(Arc::clone(&aggregator), notifier);

    info!("funding-spread-bot started");
    let dispatcher = BotDispatcher::new(client, aggregator, scheduler);
    dispatcher.run().await;
    Ok(())
}
